//! Pipeline health for the agent's liveness and readiness probes
//!
//! The agent owns three components: the BLE peripheral link, the loaded
//! classifier and the gesture feed thread. Each carries a status and the time
//! it entered that status; readiness additionally requires the inference
//! engine to have been set up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Parts of the pipeline reported on `/healthz`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Peripheral,
    Classifier,
    GestureFeed,
}

impl Component {
    pub const ALL: [Component; 3] = [
        Component::Peripheral,
        Component::Classifier,
        Component::GestureFeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Peripheral => "peripheral",
            Component::Classifier => "classifier",
            Component::GestureFeed => "gesture_feed",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from best to worst so the overall status is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still producing gestures, e.g. through a burst of malformed frames
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Healthy => "healthy",
            ComponentStatus::Degraded => "degraded",
            ComponentStatus::Unhealthy => "unhealthy",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component entered `status`
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            since: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct PipelineHealth {
    components: BTreeMap<Component, ComponentHealth>,
    engine_ready: bool,
}

impl PipelineHealth {
    fn overall(&self) -> ComponentStatus {
        self.components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }

    fn first_unhealthy(&self) -> Option<(Component, &ComponentHealth)> {
        self.components
            .iter()
            .find(|(_, c)| c.status == ComponentStatus::Unhealthy)
            .map(|(name, c)| (*name, c))
    }
}

/// Shared, cloneable view of pipeline health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    inner: Arc<RwLock<PipelineHealth>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every pipeline component as healthy
    pub async fn register_pipeline(&self) {
        for component in Component::ALL {
            self.set(component, ComponentStatus::Healthy, None).await;
        }
    }

    /// Records a status; `since` only moves when the status changes
    pub async fn set(
        &self,
        component: Component,
        status: ComponentStatus,
        message: Option<String>,
    ) {
        let mut inner = self.inner.write().await;
        match inner.components.get_mut(&component) {
            Some(existing) if existing.status == status => existing.message = message,
            _ => {
                inner
                    .components
                    .insert(component, ComponentHealth::new(status, message));
            }
        }
    }

    pub async fn set_degraded(&self, component: Component, message: impl Into<String>) {
        self.set(component, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, component: Component, message: impl Into<String>) {
        self.set(component, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Marks whether `InferenceEngine::setup` has completed
    pub async fn set_ready(&self, ready: bool) {
        self.inner.write().await.engine_ready = ready;
    }

    pub async fn health(&self) -> HealthResponse {
        let inner = self.inner.read().await;
        HealthResponse {
            status: inner.overall(),
            components: inner.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let inner = self.inner.read().await;

        let reason = if let Some((component, health)) = inner.first_unhealthy() {
            Some(match &health.message {
                Some(message) => format!("{} unhealthy: {}", component, message),
                None => format!("{} unhealthy", component),
            })
        } else if !inner.engine_ready {
            Some("inference engine not set up".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_registry_is_healthy_but_not_ready() {
        let registry = HealthRegistry::new();

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("inference engine not set up"));
    }

    #[tokio::test]
    async fn test_overall_status_is_the_worst_component() {
        let registry = HealthRegistry::new();
        registry.register_pipeline().await;
        registry
            .set_degraded(Component::Peripheral, "malformed frames")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Degraded);

        registry
            .set_unhealthy(Component::GestureFeed, "stopped")
            .await;
        assert_eq!(registry.health().await.status, ComponentStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_unhealthy_component_names_itself_in_readiness() {
        let registry = HealthRegistry::new();
        registry.register_pipeline().await;
        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry
            .set_unhealthy(Component::Peripheral, "peripheral disconnected")
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("peripheral unhealthy: peripheral disconnected")
        );
    }

    #[tokio::test]
    async fn test_since_only_moves_on_status_change() {
        let registry = HealthRegistry::new();
        registry.set_degraded(Component::Classifier, "first").await;
        let first = registry.health().await.components[&Component::Classifier].since;

        registry.set_degraded(Component::Classifier, "second").await;
        let component = registry.health().await.components[&Component::Classifier].clone();

        assert_eq!(component.since, first);
        assert_eq!(component.message.as_deref(), Some("second"));
    }

    #[test]
    fn test_components_serialize_by_name() {
        let mut components = BTreeMap::new();
        components.insert(
            Component::GestureFeed,
            ComponentHealth::new(ComponentStatus::Healthy, None),
        );
        let json = serde_json::to_value(HealthResponse {
            status: ComponentStatus::Healthy,
            components,
        })
        .unwrap();

        assert_eq!(json["components"]["gesture_feed"]["status"], "healthy");
        assert!(json["components"]["gesture_feed"].get("message").is_none());
    }
}
