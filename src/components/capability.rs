// Capability detection over the loaded provider SDK
// Pure inspection: nothing here invokes an SDK method, so detection is safe to repeat
// before every acquisition attempt while the SDK is still loading

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::provider::{
    EmailTagging, IdentityAccessor, NotificationProvider, OptOutMethod, PermissionAccessor,
    PermissionPrompt, ProviderHandle, ReadinessMarker, SdkGeneration, SdkSurface, UserTagging,
};

/// Surfaces found on the SDK at one point in time, each family in priority order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityProfile {
    /// Whether an SDK object was present at all
    pub sdk_loaded: bool,
    pub identity_accessors: Vec<IdentityAccessor>,
    pub permission_accessors: Vec<PermissionAccessor>,
    pub permission_prompts: Vec<PermissionPrompt>,
    pub user_tagging: Vec<UserTagging>,
    pub email_tagging: Vec<EmailTagging>,
    pub opt_out: Vec<OptOutMethod>,
    pub readiness_markers: Vec<ReadinessMarker>,
    pub subscription_object: bool,
    pub detected_at: DateTime<Utc>,
}

impl CapabilityProfile {
    /// Profile of an SDK that has not loaded
    pub fn empty() -> Self {
        Self {
            sdk_loaded: false,
            identity_accessors: Vec::new(),
            permission_accessors: Vec::new(),
            permission_prompts: Vec::new(),
            user_tagging: Vec::new(),
            email_tagging: Vec::new(),
            opt_out: Vec::new(),
            readiness_markers: Vec::new(),
            subscription_object: false,
            detected_at: Utc::now(),
        }
    }

    /// Ready means any known surface is present, new-style or legacy
    pub fn is_ready(&self) -> bool {
        self.sdk_loaded && !self.surfaces().is_empty()
    }

    pub fn supports(&self, surface: SdkSurface) -> bool {
        match surface {
            SdkSurface::Identity(accessor) => self.identity_accessors.contains(&accessor),
            SdkSurface::Permission(accessor) => self.permission_accessors.contains(&accessor),
            SdkSurface::Prompt(prompt) => self.permission_prompts.contains(&prompt),
            SdkSurface::UserTag(tagging) => self.user_tagging.contains(&tagging),
            SdkSurface::EmailTag(tagging) => self.email_tagging.contains(&tagging),
            SdkSurface::OptOut(method) => self.opt_out.contains(&method),
            SdkSurface::Marker(marker) => self.readiness_markers.contains(&marker),
            SdkSurface::SubscriptionObject => self.subscription_object,
        }
    }

    /// All present surfaces in detection order
    pub fn surfaces(&self) -> Vec<SdkSurface> {
        let mut surfaces = Vec::new();
        surfaces.extend(self.identity_accessors.iter().copied().map(SdkSurface::Identity));
        surfaces.extend(self.permission_accessors.iter().copied().map(SdkSurface::Permission));
        surfaces.extend(self.permission_prompts.iter().copied().map(SdkSurface::Prompt));
        surfaces.extend(self.user_tagging.iter().copied().map(SdkSurface::UserTag));
        surfaces.extend(self.email_tagging.iter().copied().map(SdkSurface::EmailTag));
        surfaces.extend(self.opt_out.iter().copied().map(SdkSurface::OptOut));
        surfaces.extend(self.readiness_markers.iter().copied().map(SdkSurface::Marker));
        if self.subscription_object {
            surfaces.push(SdkSurface::SubscriptionObject);
        }
        surfaces
    }

    /// Vendor method names of the present surfaces, for reports
    pub fn method_names(&self) -> Vec<String> {
        self.surfaces()
            .iter()
            .map(|surface| surface.method_name().to_string())
            .collect()
    }

    pub fn generation(&self) -> SdkGeneration {
        if !self.sdk_loaded {
            return SdkGeneration::Absent;
        }

        let surfaces = self.surfaces();
        let current = surfaces
            .iter()
            .any(|surface| surface.generation() == SdkGeneration::Current);
        let legacy = surfaces
            .iter()
            .any(|surface| surface.generation() == SdkGeneration::Legacy);

        match (current, legacy) {
            (true, false) => SdkGeneration::Current,
            (false, true) => SdkGeneration::Legacy,
            (false, false) if surfaces.is_empty() => SdkGeneration::Absent,
            _ => SdkGeneration::Mixed,
        }
    }

    pub fn can_read_identity(&self) -> bool {
        !self.identity_accessors.is_empty()
    }
}

impl Default for CapabilityProfile {
    fn default() -> Self {
        Self::empty()
    }
}

/// Builds capability profiles from the live SDK handle
pub struct CapabilityDetector;

impl CapabilityDetector {
    /// Inspect whatever is currently installed in the handle
    pub fn detect(handle: &ProviderHandle) -> CapabilityProfile {
        match handle.current() {
            Some(provider) => Self::inspect(provider.as_ref()),
            None => CapabilityProfile::empty(),
        }
    }

    /// Inspect a provider without invoking any of its methods
    pub fn inspect(provider: &dyn NotificationProvider) -> CapabilityProfile {
        fn present<T: Copy>(
            provider: &dyn NotificationProvider,
            family: &[T],
            wrap: fn(T) -> SdkSurface,
        ) -> Vec<T> {
            family
                .iter()
                .copied()
                .filter(|member| provider.exposes(wrap(*member)))
                .collect()
        }

        let profile = CapabilityProfile {
            sdk_loaded: true,
            identity_accessors: present(provider, &IdentityAccessor::PRIORITY, SdkSurface::Identity),
            permission_accessors: present(
                provider,
                &PermissionAccessor::PRIORITY,
                SdkSurface::Permission,
            ),
            permission_prompts: present(provider, &PermissionPrompt::PRIORITY, SdkSurface::Prompt),
            user_tagging: present(provider, &UserTagging::PRIORITY, SdkSurface::UserTag),
            email_tagging: present(provider, &EmailTagging::PRIORITY, SdkSurface::EmailTag),
            opt_out: present(provider, &OptOutMethod::PRIORITY, SdkSurface::OptOut),
            readiness_markers: present(provider, &ReadinessMarker::ALL, SdkSurface::Marker),
            subscription_object: provider.exposes(SdkSurface::SubscriptionObject),
            detected_at: Utc::now(),
        };

        tracing::debug!(
            generation = ?profile.generation(),
            identity_accessors = profile.identity_accessors.len(),
            ready = profile.is_ready(),
            "capability profile detected"
        );

        profile
    }
}
