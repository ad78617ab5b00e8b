// Notification provider seam: the injected SDK handle and its method families
// Vendor builds expose different accessor shapes, so every shape is a tagged variant
// and callers dispatch on the variant instead of probing the SDK object ad hoc

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::{PermissionState, SdkError};

/// Boxed future returned by every provider and browser call
pub type SdkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SdkError>> + Send + 'a>>;

/// Accessors that yield the per-device subscription identifier, newest API shape first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityAccessor {
    /// `User.PushSubscription.id` property (current SDK)
    SubscriptionIdProperty,
    /// `User.PushSubscription.getIdAsync()` (current SDK, async accessor)
    SubscriptionIdAsync,
    /// `getUserId()` (legacy SDK)
    UserIdGetter,
    /// `getPlayerId()` (oldest legacy SDK)
    PlayerIdGetter,
}

impl IdentityAccessor {
    /// Fixed acquisition priority
    pub const PRIORITY: [IdentityAccessor; 4] = [
        IdentityAccessor::SubscriptionIdProperty,
        IdentityAccessor::SubscriptionIdAsync,
        IdentityAccessor::UserIdGetter,
        IdentityAccessor::PlayerIdGetter,
    ];

    pub fn method_name(&self) -> &'static str {
        match self {
            IdentityAccessor::SubscriptionIdProperty => "User.PushSubscription.id",
            IdentityAccessor::SubscriptionIdAsync => "User.PushSubscription.getIdAsync",
            IdentityAccessor::UserIdGetter => "getUserId",
            IdentityAccessor::PlayerIdGetter => "getPlayerId",
        }
    }

    pub fn generation(&self) -> SdkGeneration {
        match self {
            IdentityAccessor::SubscriptionIdProperty | IdentityAccessor::SubscriptionIdAsync => {
                SdkGeneration::Current
            },
            IdentityAccessor::UserIdGetter | IdentityAccessor::PlayerIdGetter => {
                SdkGeneration::Legacy
            },
        }
    }
}

/// Accessors that report the notification permission through the SDK
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionAccessor {
    /// `Notifications.permissionNative`
    NativePermissionProperty,
    /// `getNotificationPermission()`
    PermissionGetter,
}

impl PermissionAccessor {
    pub const PRIORITY: [PermissionAccessor; 2] = [
        PermissionAccessor::NativePermissionProperty,
        PermissionAccessor::PermissionGetter,
    ];

    pub fn method_name(&self) -> &'static str {
        match self {
            PermissionAccessor::NativePermissionProperty => "Notifications.permissionNative",
            PermissionAccessor::PermissionGetter => "getNotificationPermission",
        }
    }
}

/// SDK methods that show the browser permission prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionPrompt {
    /// `Notifications.requestPermission()`
    RequestPermission,
    /// `registerForPushNotifications()`
    RegisterForPush,
}

impl PermissionPrompt {
    pub const PRIORITY: [PermissionPrompt; 2] =
        [PermissionPrompt::RequestPermission, PermissionPrompt::RegisterForPush];

    pub fn method_name(&self) -> &'static str {
        match self {
            PermissionPrompt::RequestPermission => "Notifications.requestPermission",
            PermissionPrompt::RegisterForPush => "registerForPushNotifications",
        }
    }
}

/// SDK methods that associate the application's user id with the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserTagging {
    /// `login(externalId)`
    Login,
    /// `setExternalUserId(externalId)`
    ExternalUserId,
}

impl UserTagging {
    pub const PRIORITY: [UserTagging; 2] = [UserTagging::Login, UserTagging::ExternalUserId];

    pub fn method_name(&self) -> &'static str {
        match self {
            UserTagging::Login => "login",
            UserTagging::ExternalUserId => "setExternalUserId",
        }
    }
}

/// SDK methods that attach an email address for targeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmailTagging {
    /// `User.addEmail(email)`
    AddEmail,
    /// `setEmail(email)`
    SetEmail,
}

impl EmailTagging {
    pub const PRIORITY: [EmailTagging; 2] = [EmailTagging::AddEmail, EmailTagging::SetEmail];

    pub fn method_name(&self) -> &'static str {
        match self {
            EmailTagging::AddEmail => "User.addEmail",
            EmailTagging::SetEmail => "setEmail",
        }
    }
}

/// SDK methods that stop delivery to this device without touching OS permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptOutMethod {
    /// `User.PushSubscription.optOut()`
    PushSubscriptionOptOut,
    /// `setSubscription(false)`
    SetSubscriptionFalse,
}

impl OptOutMethod {
    pub const PRIORITY: [OptOutMethod; 2] =
        [OptOutMethod::PushSubscriptionOptOut, OptOutMethod::SetSubscriptionFalse];

    pub fn method_name(&self) -> &'static str {
        match self {
            OptOutMethod::PushSubscriptionOptOut => "User.PushSubscription.optOut",
            OptOutMethod::SetSubscriptionFalse => "setSubscription",
        }
    }
}

/// Non-callable surfaces whose presence shows the SDK finished loading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadinessMarker {
    UserNamespace,
    NotificationsNamespace,
    InitializedFlag,
    LegacyInit,
}

impl ReadinessMarker {
    pub const ALL: [ReadinessMarker; 4] = [
        ReadinessMarker::UserNamespace,
        ReadinessMarker::NotificationsNamespace,
        ReadinessMarker::InitializedFlag,
        ReadinessMarker::LegacyInit,
    ];

    pub fn method_name(&self) -> &'static str {
        match self {
            ReadinessMarker::UserNamespace => "User",
            ReadinessMarker::NotificationsNamespace => "Notifications",
            ReadinessMarker::InitializedFlag => "initialized",
            ReadinessMarker::LegacyInit => "init",
        }
    }
}

/// Every known SDK surface, grouped by family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SdkSurface {
    Identity(IdentityAccessor),
    Permission(PermissionAccessor),
    Prompt(PermissionPrompt),
    UserTag(UserTagging),
    EmailTag(EmailTagging),
    OptOut(OptOutMethod),
    Marker(ReadinessMarker),
    /// The push subscription object itself, scanned during diagnosis
    SubscriptionObject,
}

impl SdkSurface {
    /// All surfaces the detector inspects
    pub fn all() -> Vec<SdkSurface> {
        let mut surfaces = Vec::with_capacity(19);
        surfaces.extend(IdentityAccessor::PRIORITY.map(SdkSurface::Identity));
        surfaces.extend(PermissionAccessor::PRIORITY.map(SdkSurface::Permission));
        surfaces.extend(PermissionPrompt::PRIORITY.map(SdkSurface::Prompt));
        surfaces.extend(UserTagging::PRIORITY.map(SdkSurface::UserTag));
        surfaces.extend(EmailTagging::PRIORITY.map(SdkSurface::EmailTag));
        surfaces.extend(OptOutMethod::PRIORITY.map(SdkSurface::OptOut));
        surfaces.extend(ReadinessMarker::ALL.map(SdkSurface::Marker));
        surfaces.push(SdkSurface::SubscriptionObject);
        surfaces
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            SdkSurface::Identity(accessor) => accessor.method_name(),
            SdkSurface::Permission(accessor) => accessor.method_name(),
            SdkSurface::Prompt(prompt) => prompt.method_name(),
            SdkSurface::UserTag(tagging) => tagging.method_name(),
            SdkSurface::EmailTag(tagging) => tagging.method_name(),
            SdkSurface::OptOut(method) => method.method_name(),
            SdkSurface::Marker(marker) => marker.method_name(),
            SdkSurface::SubscriptionObject => "User.PushSubscription",
        }
    }

    pub fn generation(&self) -> SdkGeneration {
        match self {
            SdkSurface::Identity(accessor) => accessor.generation(),
            SdkSurface::Permission(PermissionAccessor::NativePermissionProperty)
            | SdkSurface::Prompt(PermissionPrompt::RequestPermission)
            | SdkSurface::UserTag(UserTagging::Login)
            | SdkSurface::EmailTag(EmailTagging::AddEmail)
            | SdkSurface::OptOut(OptOutMethod::PushSubscriptionOptOut)
            | SdkSurface::Marker(ReadinessMarker::UserNamespace)
            | SdkSurface::Marker(ReadinessMarker::NotificationsNamespace)
            | SdkSurface::SubscriptionObject => SdkGeneration::Current,
            SdkSurface::Marker(ReadinessMarker::InitializedFlag) => SdkGeneration::Mixed,
            _ => SdkGeneration::Legacy,
        }
    }
}

/// Which SDK build the detected surfaces belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkGeneration {
    /// Only current-shape surfaces were found
    Current,
    /// Only legacy-shape surfaces were found
    Legacy,
    /// Both shapes, or only shape-neutral markers
    Mixed,
    /// Nothing loaded
    Absent,
}

/// Notification provider SDK as seen from Rust
///
/// `exposes` must be a pure presence check. The invocation methods are only called
/// for surfaces the capability profile reported as present.
pub trait NotificationProvider: Send + Sync {
    fn exposes(&self, surface: SdkSurface) -> bool;

    fn read_identity(&self, accessor: IdentityAccessor) -> SdkFuture<'_, Option<String>>;

    fn read_permission(&self, accessor: PermissionAccessor)
    -> SdkFuture<'_, Option<PermissionState>>;

    fn request_permission(&self, prompt: PermissionPrompt) -> SdkFuture<'_, PermissionState>;

    fn tag_user<'a>(&'a self, method: UserTagging, user_id: &'a str) -> SdkFuture<'a, ()>;

    fn tag_email<'a>(&'a self, method: EmailTagging, email: &'a str) -> SdkFuture<'a, ()>;

    fn opt_out(&self, method: OptOutMethod) -> SdkFuture<'_, ()>;

    /// JSON view of the SDK's push subscription object
    fn subscription_snapshot(&self) -> SdkFuture<'_, Option<serde_json::Value>>;
}

/// Native browser notification API
pub trait BrowserNotifications: Send + Sync {
    /// Current permission, or `None` when the API is unsupported
    fn permission(&self) -> Option<PermissionState>;

    fn request_permission(&self) -> SdkFuture<'_, PermissionState>;

    fn show<'a>(&'a self, notice: &'a LocalNotice) -> SdkFuture<'a, ()>;
}

/// Locally dispatched notification used by `send_test`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalNotice {
    pub title: String,
    pub body: String,
    pub url: Option<url::Url>,
}

/// Shared slot holding the SDK once its script has loaded
#[derive(Clone)]
pub struct ProviderHandle {
    slot: Arc<watch::Sender<Option<Arc<dyn NotificationProvider>>>>,
}

impl ProviderHandle {
    /// An empty handle (SDK not loaded yet)
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            slot: Arc::new(sender),
        }
    }

    pub fn with_provider(provider: Arc<dyn NotificationProvider>) -> Self {
        let handle = Self::new();
        handle.install(provider);
        handle
    }

    /// Publish a loaded SDK; wakes any readiness wait
    pub fn install(&self, provider: Arc<dyn NotificationProvider>) {
        self.slot.send_replace(Some(provider));
        tracing::debug!("notification provider installed");
    }

    pub fn clear(&self) {
        self.slot.send_replace(None);
    }

    pub fn current(&self) -> Option<Arc<dyn NotificationProvider>> {
        self.slot.borrow().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Receiver that observes installs and clears
    pub fn watch(&self) -> watch::Receiver<Option<Arc<dyn NotificationProvider>>> {
        self.slot.subscribe()
    }
}

impl Default for ProviderHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
