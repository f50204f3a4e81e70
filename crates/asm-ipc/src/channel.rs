//! Channel addressing
//!
//! A State and its Kernel talk over two logical channels derived from the
//! owning layer's name and the state's name:
//!
//! - **downlink** (State → Kernel): `asm://<layer>/<name>/state` → `asm://<layer>/<name>/kernel`
//! - **uplink** (Kernel → State): `asm://<layer>/<name>/kernel` → `asm://<layer>/<name>/state`
//!
//! Both processes compute the same pair independently, so the only addressing
//! information a spawned Kernel needs is `(layer, name)`.

use core::fmt;

/// A directed `(producer, consumer)` channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId {
    pub producer: String,
    pub consumer: String,
}

impl ChannelId {
    pub fn new(producer: impl Into<String>, consumer: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            consumer: consumer.into(),
        }
    }

    /// Endpoint name of the supervisor side of a pair.
    pub fn state_endpoint(layer: &str, name: &str) -> String {
        format!("asm://{}/{}/state", layer, name)
    }

    /// Endpoint name of the child side of a pair.
    pub fn kernel_endpoint(layer: &str, name: &str) -> String {
        format!("asm://{}/{}/kernel", layer, name)
    }

    /// State → Kernel channel.
    pub fn downlink(layer: &str, name: &str) -> Self {
        Self::new(
            Self::state_endpoint(layer, name),
            Self::kernel_endpoint(layer, name),
        )
    }

    /// Kernel → State channel.
    pub fn uplink(layer: &str, name: &str) -> Self {
        Self::new(
            Self::kernel_endpoint(layer, name),
            Self::state_endpoint(layer, name),
        )
    }

    /// The same channel in the opposite direction.
    pub fn reversed(&self) -> Self {
        Self::new(self.consumer.clone(), self.producer.clone())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.producer, self.consumer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_naming_is_deterministic() {
        assert_eq!(ChannelId::downlink("arm", "grip"), ChannelId::downlink("arm", "grip"));
        assert_eq!(ChannelId::downlink("arm", "grip").producer, "asm://arm/grip/state");
        assert_eq!(ChannelId::uplink("arm", "grip").producer, "asm://arm/grip/kernel");
    }

    #[test]
    fn test_uplink_is_reversed_downlink() {
        let down = ChannelId::downlink("arm", "grip");
        assert_eq!(down.reversed(), ChannelId::uplink("arm", "grip"));
        assert_ne!(down, ChannelId::downlink("arm", "release"));
    }
}
