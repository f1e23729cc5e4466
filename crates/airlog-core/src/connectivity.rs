//! Wireless collaborators: the Wi-Fi manager and the BLE peripheral
//!
//! Wi-Fi is only ever up on request. A connection attempt is given
//! [`WIFI_CONNECT_TIMEOUT`] to succeed; once it does, the remote status
//! endpoint and update listener are started and the wall clock is synced.
//! There is no automatic retry.

use core::net::Ipv4Addr;

use embassy_time::{Duration, Instant};
use log::{info, warn};

use crate::power::BleLink;
use crate::sensors::SensorReading;
use crate::ui::NoticeKind;
use crate::wall_clock::WallClock;

pub const WIFI_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Wi-Fi state as shown in the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WifiStatus {
    #[default]
    Off,
    Connecting,
    Connected(Ipv4Addr),
}

/// Station-mode Wi-Fi plus the services that run on top of it.
pub trait Connectivity {
    /// Power the radio up and start joining the configured network.
    fn request_connect(&mut self);

    /// Leave the network and power the radio down.
    fn request_disconnect(&mut self);

    fn is_connected(&self) -> bool;

    fn local_ip(&self) -> Option<Ipv4Addr>;

    /// Start the remote status endpoint and the update listener.
    fn start_services(&mut self);

    fn stop_services(&mut self);

    /// Current Unix time from the network, if it can be had.
    fn network_time(&mut self) -> Option<i64>;
}

/// Values pushed to BLE subscribers on every sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BleReadings {
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    pub iaq: f32,
    pub co2: f32,
}

impl From<&SensorReading> for BleReadings {
    fn from(reading: &SensorReading) -> Self {
        Self {
            temperature: reading.temperature,
            humidity: reading.humidity,
            pressure: reading.pressure,
            iaq: reading.iaq,
            co2: reading.co2,
        }
    }
}

/// BLE peripheral republishing readings. Owns encoding and notification.
pub trait BlePeripheral {
    fn start(&mut self);

    fn stop(&mut self);

    fn link(&self) -> BleLink;

    fn publish(&mut self, readings: &BleReadings);
}

/// Start or stop BLE, returning the notice to show.
pub fn toggle_ble<B: BlePeripheral>(ble: &mut B) -> NoticeKind {
    if ble.link() == BleLink::Off {
        info!("Starting BLE");
        ble.start();
        NoticeKind::BleStarting
    } else {
        info!("Stopping BLE");
        ble.stop();
        NoticeKind::BleStopping
    }
}

/// Tracks one user-requested Wi-Fi session.
#[derive(Debug, Clone, Copy, Default)]
pub struct WifiSession {
    connecting_since: Option<Instant>,
    services_started: bool,
}

impl WifiSession {
    pub const fn new() -> Self {
        Self {
            connecting_since: None,
            services_started: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.connecting_since.is_some()
    }

    #[cfg(test)]
    pub(crate) fn services_started(&self) -> bool {
        self.services_started
    }

    /// Connected, or a connection attempt is outstanding.
    pub fn is_busy<C: Connectivity>(&self, wifi: &C) -> bool {
        self.is_pending() || wifi.is_connected()
    }

    pub fn status<C: Connectivity>(&self, wifi: &C) -> WifiStatus {
        match wifi.local_ip() {
            Some(ip) if wifi.is_connected() => WifiStatus::Connected(ip),
            _ if self.is_pending() => WifiStatus::Connecting,
            _ => WifiStatus::Off,
        }
    }

    /// Menu toggle: disconnect when connected, otherwise start connecting.
    pub fn toggle<C: Connectivity>(&mut self, now: Instant, wifi: &mut C) -> NoticeKind {
        if wifi.is_connected() {
            info!("Stopping WiFi");
            wifi.stop_services();
            wifi.request_disconnect();
            self.services_started = false;
            self.connecting_since = None;
            NoticeKind::WifiStopping
        } else {
            info!("Connecting WiFi");
            wifi.request_connect();
            self.connecting_since = Some(now);
            NoticeKind::WifiConnecting
        }
    }

    /// Advance a pending connection attempt; called once per loop iteration.
    pub fn tick<C: Connectivity>(&mut self, now: Instant, wifi: &mut C, clock: &mut WallClock) {
        let Some(since) = self.connecting_since else {
            return;
        };

        if wifi.is_connected() {
            if !self.services_started {
                wifi.start_services();
                self.services_started = true;
                info!("WiFi connected, services started");
            }
            if !clock.is_synced() {
                match wifi.network_time() {
                    Some(unix_secs) => clock.sync(now, unix_secs),
                    None => warn!("Network time unavailable"),
                }
            }
            self.connecting_since = None;
        } else if now.saturating_duration_since(since) > WIFI_CONNECT_TIMEOUT {
            warn!("WiFi connection timed out, powering radio down");
            wifi.request_disconnect();
            self.connecting_since = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBle, FakeWifi};

    fn ms(v: u64) -> Instant {
        Instant::from_millis(v)
    }

    #[test]
    fn test_connect_starts_services_and_syncs_clock_once() {
        let mut wifi = FakeWifi::default();
        let mut session = WifiSession::new();
        let mut clock = WallClock::default();

        assert_eq!(session.toggle(ms(0), &mut wifi), NoticeKind::WifiConnecting);
        assert_eq!(session.status(&wifi), WifiStatus::Connecting);
        assert!(session.is_busy(&wifi));

        session.tick(ms(500), &mut wifi, &mut clock);
        assert!(session.is_pending());

        wifi.connected = true;
        session.tick(ms(1000), &mut wifi, &mut clock);
        assert!(!session.is_pending());
        assert!(session.services_started());
        assert_eq!(wifi.services_starts, 1);
        assert!(clock.is_synced());
        assert_eq!(
            session.status(&wifi),
            WifiStatus::Connected(Ipv4Addr::new(192, 168, 4, 2))
        );

        session.tick(ms(2000), &mut wifi, &mut clock);
        assert_eq!(wifi.services_starts, 1);
    }

    #[test]
    fn test_connect_attempt_times_out() {
        let mut wifi = FakeWifi::default();
        let mut session = WifiSession::new();
        let mut clock = WallClock::default();

        session.toggle(ms(0), &mut wifi);
        session.tick(ms(10_000), &mut wifi, &mut clock);
        assert!(session.is_pending());

        session.tick(ms(10_001), &mut wifi, &mut clock);
        assert!(!session.is_pending());
        assert!(!wifi.radio_on);
        assert_eq!(session.status(&wifi), WifiStatus::Off);
        assert!(!session.is_busy(&wifi));
    }

    #[test]
    fn test_toggle_while_connected_disconnects() {
        let mut wifi = FakeWifi::default();
        let mut session = WifiSession::new();
        let mut clock = WallClock::default();
        session.toggle(ms(0), &mut wifi);
        wifi.connected = true;
        session.tick(ms(100), &mut wifi, &mut clock);

        assert_eq!(session.toggle(ms(200), &mut wifi), NoticeKind::WifiStopping);
        assert!(!wifi.connected);
        assert!(!wifi.services_running);
        assert!(!session.services_started());
    }

    #[test]
    fn test_ble_toggle() {
        let mut ble = FakeBle::default();
        assert_eq!(toggle_ble(&mut ble), NoticeKind::BleStarting);
        assert_eq!(ble.link(), BleLink::Advertising);
        assert_eq!(toggle_ble(&mut ble), NoticeKind::BleStopping);
        assert_eq!(ble.link(), BleLink::Off);
    }
}
