//! Runtime configuration for the bridge.

use serde::Deserialize;

/// Configuration applied by [`Bridge::init`](crate::Bridge::init).
///
/// Deserializable with every field optional, so hosts can embed a
/// `[bridge]` table in their own config files.
///
/// ```
/// use objbridge::BridgeConfig;
///
/// let config = BridgeConfig::default()
///     .with_max_promotion_depth(4)
///     .with_initializers(false);
/// assert_eq!(config.max_promotion_depth, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Initial capacity of the identity map.
    pub identity_map_capacity: usize,
    /// Maximum number of chained promotions applied to a single push.
    pub max_promotion_depth: usize,
    /// Whether class initializers run when a proxy is first registered.
    pub run_initializers: bool,
    /// Whether `init` warns about subclasses lacking their own serializer.
    pub audit_serializers: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            identity_map_capacity: 256,
            max_promotion_depth: 16,
            run_initializers: true,
            audit_serializers: true,
        }
    }
}

impl BridgeConfig {
    pub fn with_identity_map_capacity(mut self, capacity: usize) -> Self {
        self.identity_map_capacity = capacity;
        self
    }

    pub fn with_max_promotion_depth(mut self, depth: usize) -> Self {
        self.max_promotion_depth = depth;
        self
    }

    pub fn with_initializers(mut self, enabled: bool) -> Self {
        self.run_initializers = enabled;
        self
    }

    pub fn with_serializer_audit(mut self, enabled: bool) -> Self {
        self.audit_serializers = enabled;
        self
    }
}
