use std::time::{Duration, Instant};

/// A single clonable value that expires after a per-value TTL.
///
/// Used for short-lived credentials such as the Keycloak admin token, whose
/// lifetime is only known once the value is fetched.
pub struct ExpiringValue<T: Clone> {
    value: Option<T>,
    expires_at: Option<Instant>,
}

impl<T: Clone> Default for ExpiringValue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ExpiringValue<T> {
    pub fn new() -> Self {
        Self {
            value: None,
            expires_at: None,
        }
    }

    /// Returns the value only while it has not expired.
    pub fn get(&self) -> Option<T> {
        if self.is_fresh() {
            self.value.clone()
        } else {
            None
        }
    }

    pub fn set(&mut self, value: T, ttl: Duration) {
        self.value = Some(value);
        self.expires_at = Some(Instant::now() + ttl);
    }

    pub fn invalidate(&mut self) {
        self.value = None;
        self.expires_at = None;
    }

    pub fn is_fresh(&self) -> bool {
        match (self.value.as_ref(), self.expires_at) {
            (Some(_), Some(expires_at)) => Instant::now() < expires_at,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn get_returns_none_when_empty() {
        let cache = ExpiringValue::<String>::new();
        assert!(cache.get().is_none());
    }

    #[test]
    fn get_returns_value_before_expiry() {
        let mut cache = ExpiringValue::new();
        cache.set("token".to_string(), Duration::from_secs(5));

        assert_eq!(cache.get().as_deref(), Some("token"));
        assert!(cache.is_fresh());
    }

    #[test]
    fn value_expires_after_its_own_ttl() {
        let mut cache = ExpiringValue::new();
        cache.set(1_u8, Duration::from_millis(10));
        thread::sleep(Duration::from_millis(20));

        assert!(cache.get().is_none());
    }

    #[test]
    fn zero_ttl_is_never_fresh() {
        let mut cache = ExpiringValue::new();
        cache.set(1_u8, Duration::ZERO);
        assert!(!cache.is_fresh());
    }

    #[test]
    fn invalidate_clears_value() {
        let mut cache = ExpiringValue::new();
        cache.set(1_u8, Duration::from_secs(60));
        cache.invalidate();
        assert!(cache.get().is_none());
    }
}
