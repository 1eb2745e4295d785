//! Repository watcher seam and the in-memory subscription registry
//!
//! The scan loop hands every qualifying image to a [`Watcher`]. The watcher
//! owns subscription state and must absorb repeated requests for the same
//! image: a rescan re-issues every request, and only a changed schedule
//! should alter anything.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use keel_common::{schedule, Error};

/// Request to start (or refresh) watching an image repository
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchRequest {
    /// Image reference as written in the container spec
    pub image: String,
    /// Poll schedule for this image
    pub schedule: String,
    /// Reserved: registry username
    pub registry_username: Option<String>,
    /// Reserved: registry password
    pub registry_password: Option<String>,
}

impl WatchRequest {
    /// Request without registry credentials
    pub fn new(image: impl Into<String>, schedule: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            schedule: schedule.into(),
            registry_username: None,
            registry_password: None,
        }
    }
}

/// Accepts watch requests and owns the resulting subscriptions
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Watcher: Send + Sync {
    /// Begin or refresh a watch; idempotent per image reference
    async fn watch(&self, request: &WatchRequest) -> Result<(), Error>;
}

/// A registered image subscription
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Subscription {
    /// Image reference being watched
    pub image: String,
    /// Current poll schedule
    pub schedule: String,
    /// When the image was first registered
    pub registered_at: DateTime<Utc>,
    /// When the schedule last changed
    pub updated_at: DateTime<Utc>,
}

/// What a registration did to the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// First request for this image
    Created,
    /// Image was known; its schedule changed
    Rescheduled,
    /// Image was known with the same schedule
    Unchanged,
}

/// In-memory watcher keyed by image reference
///
/// Entries are only ever added or rescheduled. Images from deleted or
/// relabelled deployments stay registered; pruning belongs to the repository
/// watcher that owns polling.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: DashMap<String, Subscription>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
        }
    }

    /// Register a request, reporting whether anything changed
    pub fn register(&self, request: &WatchRequest) -> Result<Registration, Error> {
        if request.image.trim().is_empty() {
            return Err(Error::watch(&request.image, "image reference is empty"));
        }
        schedule::validate(&request.schedule)
            .map_err(|e| Error::watch(&request.image, e.to_string()))?;

        let now = Utc::now();
        match self.subscriptions.entry(request.image.clone()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Subscription {
                    image: request.image.clone(),
                    schedule: request.schedule.clone(),
                    registered_at: now,
                    updated_at: now,
                });
                Ok(Registration::Created)
            }
            Entry::Occupied(mut occupied) => {
                let sub = occupied.get_mut();
                if sub.schedule == request.schedule {
                    return Ok(Registration::Unchanged);
                }
                sub.schedule = request.schedule.clone();
                sub.updated_at = now;
                Ok(Registration::Rescheduled)
            }
        }
    }

    /// Look up the subscription for an image
    pub fn get(&self, image: &str) -> Option<Subscription> {
        self.subscriptions.get(image).map(|entry| entry.clone())
    }

    /// Snapshot of every subscription, sorted by image
    pub fn subscriptions(&self) -> Vec<Subscription> {
        let mut all: Vec<Subscription> = self
            .subscriptions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.image.cmp(&b.image));
        all
    }

    /// Number of watched images
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// True when nothing is watched
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

#[async_trait]
impl Watcher for SubscriptionRegistry {
    async fn watch(&self, request: &WatchRequest) -> Result<(), Error> {
        match self.register(request)? {
            Registration::Created => info!(
                image = %request.image,
                schedule = %request.schedule,
                "started watching repository"
            ),
            Registration::Rescheduled => info!(
                image = %request.image,
                schedule = %request.schedule,
                "updated repository watch schedule"
            ),
            Registration::Unchanged => debug!(
                image = %request.image,
                "repository already watched"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: rescans don't duplicate subscriptions
    #[tokio::test]
    async fn story_repeated_watch_is_idempotent() {
        let registry = SubscriptionRegistry::new();
        let request = WatchRequest::new("repo/app:latest", "@every 1m");

        registry.watch(&request).await.unwrap();
        let first = registry.get("repo/app:latest").unwrap();

        registry.watch(&request).await.unwrap();
        registry.watch(&request).await.unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("repo/app:latest").unwrap(), first);
    }

    /// Story: a schedule label change refreshes the existing subscription
    #[test]
    fn story_changed_schedule_reschedules() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(
            registry
                .register(&WatchRequest::new("repo/app:1.0", "@every 1m"))
                .unwrap(),
            Registration::Created
        );
        assert_eq!(
            registry
                .register(&WatchRequest::new("repo/app:1.0", "@every 5m"))
                .unwrap(),
            Registration::Rescheduled
        );
        assert_eq!(
            registry
                .register(&WatchRequest::new("repo/app:1.0", "@every 5m"))
                .unwrap(),
            Registration::Unchanged
        );

        let sub = registry.get("repo/app:1.0").unwrap();
        assert_eq!(sub.schedule, "@every 5m");
        assert!(sub.updated_at >= sub.registered_at);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let registry = SubscriptionRegistry::new();
        let err = registry
            .register(&WatchRequest::new("", "@every 1m"))
            .unwrap_err();
        assert!(matches!(err, Error::Watch { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_schedule_is_rejected_without_registering() {
        let registry = SubscriptionRegistry::new();
        let err = registry
            .register(&WatchRequest::new("repo/app:latest", "@every never"))
            .unwrap_err();
        assert!(matches!(&err, Error::Watch { image, .. } if image == "repo/app:latest"));
        assert!(registry.get("repo/app:latest").is_none());
    }

    #[test]
    fn test_subscriptions_are_sorted_by_image() {
        let registry = SubscriptionRegistry::new();
        for image in ["zeta/app:1", "alpha/app:1", "mid/app:1"] {
            registry
                .register(&WatchRequest::new(image, "@hourly"))
                .unwrap();
        }
        let images: Vec<String> = registry
            .subscriptions()
            .into_iter()
            .map(|s| s.image)
            .collect();
        assert_eq!(images, vec!["alpha/app:1", "mid/app:1", "zeta/app:1"]);
    }

    #[test]
    fn test_reserved_fields_default_to_none() {
        let request = WatchRequest::new("repo/app:latest", "@every 1m");
        assert_eq!(request.registry_username, None);
        assert_eq!(request.registry_password, None);
    }
}
