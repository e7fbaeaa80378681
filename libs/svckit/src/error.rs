use thiserror::Error;

use crate::provider::ProviderError;

/// Lifecycle phase an extension hook ran in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    Prehook,
    MutateContainer,
    ModifyBuildProps,
    PatchAfterCreate,
    PostHook,
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Prehook => "prehook",
            Self::MutateContainer => "mutate_container_definition",
            Self::ModifyBuildProps => "modify_build_props",
            Self::PatchAfterCreate => "patch_after_create",
            Self::PostHook => "post_hook",
        };
        f.write_str(s)
    }
}

/// Coarse error category, used by callers that only care about the class of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Description or deployment is malformed; reported before any provider call.
    Configuration,
    /// An extension needs another extension or resource that is not there.
    Dependency,
    /// Services are wired across boundaries they cannot cross.
    Topology,
    /// A resource provider rejected a request.
    Provisioning,
    /// Any other failure raised from inside an extension hook.
    Hook,
}

/// Structured errors for building and connecting services.
#[derive(Debug, Error)]
pub enum BuildError {
    // Configuration errors
    #[error("service description has no container definition")]
    MissingContainer,
    #[error("service description has multiple container definitions: {}", names.join(", "))]
    MultipleContainers { names: Vec<String> },
    #[error("extension '{0}' is already registered")]
    DuplicateExtension(String),
    #[error("invalid container definition '{extension}': {reason}")]
    InvalidContainer { extension: String, reason: String },
    #[error("extension '{extension}' may only append environment entries, but '{key}' is already set")]
    PatchOverwrite { extension: String, key: String },
    #[error("service '{0}' is already built in this deployment")]
    DuplicateService(String),
    #[error("environment '{0}' is already registered")]
    DuplicateEnvironment(String),

    // Dependency errors
    #[error("extension '{extension}' requires extension '{requires}', which is not registered")]
    MissingDependency { extension: String, requires: String },

    // Topology errors
    #[error("unable to connect service '{from}' in environment '{from_env}' to service '{to}' in environment '{to_env}': services can not be connected across environment boundaries")]
    CrossEnvironment {
        from: String,
        from_env: String,
        to: String,
        to_env: String,
    },
    #[error("service '{service}' has no service discovery capability")]
    NoDiscoveryCapability { service: String },
    #[error("service '{0}' has not been built")]
    ServiceNotBuilt(String),
    #[error("unknown environment '{0}'")]
    UnknownEnvironment(String),
    #[error("service '{0}' can not be connected to itself")]
    SelfConnection(String),

    // Provisioning errors
    #[error("resource provisioning failed for extension '{extension}'")]
    Provisioning {
        extension: String,
        #[source]
        source: ProviderError,
    },

    // Anything else raised by a hook
    #[error("{phase} failed for extension '{extension}'")]
    Hook {
        phase: HookPhase,
        extension: String,
        #[source]
        source: anyhow::Error,
    },
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingContainer
            | Self::MultipleContainers { .. }
            | Self::DuplicateExtension(_)
            | Self::InvalidContainer { .. }
            | Self::PatchOverwrite { .. }
            | Self::DuplicateService(_)
            | Self::DuplicateEnvironment(_) => ErrorKind::Configuration,
            Self::MissingDependency { .. } => ErrorKind::Dependency,
            Self::CrossEnvironment { .. }
            | Self::NoDiscoveryCapability { .. }
            | Self::ServiceNotBuilt(_)
            | Self::UnknownEnvironment(_)
            | Self::SelfConnection(_) => ErrorKind::Topology,
            Self::Provisioning { .. } => ErrorKind::Provisioning,
            Self::Hook { .. } => ErrorKind::Hook,
        }
    }

    /// Map an error raised from inside a hook back to a typed variant.
    ///
    /// Typed build errors and provider rejections pass through with their own
    /// variant; everything else is wrapped with phase and extension context.
    pub(crate) fn from_hook(phase: HookPhase, extension: &str, err: anyhow::Error) -> Self {
        let err = match err.downcast::<BuildError>() {
            Ok(build) => return build,
            Err(other) => other,
        };
        match err.downcast::<ProviderError>() {
            Ok(source) => Self::Provisioning {
                extension: extension.to_string(),
                source,
            },
            Err(source) => Self::Hook {
                phase,
                extension: extension.to_string(),
                source,
            },
        }
    }
}

pub type BuildResult<T> = Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_pass_through_hook_mapping() {
        let raised = anyhow::Error::new(BuildError::MissingDependency {
            extension: "firelens".to_string(),
            requires: "logs".to_string(),
        });

        let mapped = BuildError::from_hook(HookPhase::Prehook, "firelens", raised);
        match mapped {
            BuildError::MissingDependency { extension, requires } => {
                assert_eq!(extension, "firelens");
                assert_eq!(requires, "logs");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn provider_errors_become_provisioning_errors() {
        let raised = anyhow::Error::new(ProviderError::new(
            "memory",
            "provision_queue",
            "quota exceeded",
        ));

        let mapped = BuildError::from_hook(HookPhase::Prehook, "queue", raised);
        assert_eq!(mapped.kind(), ErrorKind::Provisioning);
        match mapped {
            BuildError::Provisioning { extension, source } => {
                assert_eq!(extension, "queue");
                assert_eq!(source.message, "quota exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn other_errors_keep_phase_context() {
        let mapped = BuildError::from_hook(
            HookPhase::ModifyBuildProps,
            "custom",
            anyhow::anyhow!("bad knob"),
        );
        assert_eq!(mapped.kind(), ErrorKind::Hook);
        let msg = mapped.to_string();
        assert!(msg.contains("modify_build_props"));
        assert!(msg.contains("custom"));
    }

    #[test]
    fn cross_environment_message_names_both_environments() {
        let err = BuildError::CrossEnvironment {
            from: "results".to_string(),
            from_env: "production".to_string(),
            to: "api".to_string(),
            to_env: "other".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Topology);
        let msg = err.to_string();
        assert!(msg.contains("production"));
        assert!(msg.contains("other"));
    }

    #[test]
    fn phase_names_match_the_hook_methods() {
        let names: Vec<_> = [
            HookPhase::Prehook,
            HookPhase::MutateContainer,
            HookPhase::ModifyBuildProps,
            HookPhase::PatchAfterCreate,
            HookPhase::PostHook,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(
            names,
            [
                "prehook",
                "mutate_container_definition",
                "modify_build_props",
                "patch_after_create",
                "post_hook"
            ]
        );
    }
}
