//! Bluetooth LE transport backed by btleplug

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::guard::CleanupGuard;
use super::{DiscoveredDevice, PayloadSender, Transport, TransportSession};
use crate::error::TransportError;
use crate::midi::format_hex;

/// BLE transport using the first available adapter
pub struct BleTransport {
    adapter: Adapter,
    /// Peripherals seen by the last scans, keyed by reported address
    peripherals: Mutex<HashMap<String, Peripheral>>,
}

impl BleTransport {
    /// Open the platform Bluetooth manager and pick the first adapter
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(TransportError::NoAdapter)?;

        match adapter.adapter_info().await {
            Ok(info) => info!("Using Bluetooth adapter: {}", info),
            Err(e) => debug!("Adapter info unavailable: {}", e),
        }

        Ok(Self {
            adapter,
            peripherals: Mutex::new(HashMap::new()),
        })
    }

    /// Stable address string for a peripheral
    ///
    /// Some platforms (macOS) hide the MAC address; fall back to the opaque id.
    fn address_of(peripheral: &Peripheral) -> String {
        let addr = peripheral.address();
        if addr == BDAddr::default() {
            format!("{:?}", peripheral.id())
        } else {
            addr.to_string()
        }
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, TransportError> {
        debug!("Starting BLE scan ({:?})", timeout);
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| TransportError::Scan(e.to_string()))?;

        let adapter = self.adapter.clone();
        let stop = CleanupGuard::new(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop BLE scan: {}", e);
            }
        });

        tokio::time::sleep(timeout).await;
        stop.run().await;

        let mut devices = Vec::new();
        let mut cache = HashMap::new();

        for peripheral in self.adapter.peripherals().await? {
            let name = match peripheral.properties().await {
                Ok(Some(props)) => props.local_name,
                Ok(None) => None,
                Err(e) => {
                    trace!("No properties for peripheral: {}", e);
                    None
                },
            };

            // Unnamed peripherals can never match a device name pattern
            let Some(name) = name else { continue };

            let address = Self::address_of(&peripheral);
            trace!("Seen peripheral '{}' ({})", name, address);

            devices.push(DiscoveredDevice {
                name,
                address: address.clone(),
            });
            cache.insert(address, peripheral);
        }

        debug!("BLE scan found {} named device(s)", devices.len());
        self.peripherals.lock().extend(cache);

        Ok(devices)
    }

    async fn connect(&self, address: &str) -> Result<Box<dyn TransportSession>, TransportError> {
        let peripheral = self
            .peripherals
            .lock()
            .get(address)
            .cloned()
            .ok_or_else(|| TransportError::UnknownDevice(address.to_string()))?;

        if !peripheral.is_connected().await.unwrap_or(false) {
            // Only links opened here are torn down on failure
            let link = peripheral.clone();
            let disconnect = CleanupGuard::new(async move {
                if let Err(e) = link.disconnect().await {
                    debug!("Disconnect after failed connect: {}", e);
                }
            });

            let opened = match peripheral.connect().await {
                Ok(()) => peripheral.discover_services().await,
                Err(e) => Err(e),
            };
            if let Err(e) = opened {
                disconnect.run().await;
                return Err(TransportError::Connect(e.to_string()));
            }
            disconnect.dismiss();
        } else {
            peripheral
                .discover_services()
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
        }

        debug!("BLE session open: {}", address);

        Ok(Box::new(BleSession {
            peripheral,
            characteristic: None,
            forwarder: None,
        }))
    }
}

/// Connected BLE peripheral
struct BleSession {
    peripheral: Peripheral,
    characteristic: Option<Characteristic>,
    /// Task moving notifications into the payload queue
    forwarder: Option<JoinHandle<()>>,
}

impl BleSession {
    fn find_characteristic(&self, uuid: Uuid) -> Option<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid && c.properties.contains(CharPropFlags::NOTIFY))
    }

    fn stop_forwarder(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl TransportSession for BleSession {
    async fn subscribe(
        &mut self,
        characteristic: Uuid,
        payloads: PayloadSender,
    ) -> Result<(), TransportError> {
        let target = self
            .find_characteristic(characteristic)
            .ok_or(TransportError::CharacteristicNotFound(characteristic))?;

        // Take the stream before subscribing so the first notifications are not missed
        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        self.peripheral
            .subscribe(&target)
            .await
            .map_err(|e| TransportError::Subscribe(e.to_string()))?;

        self.stop_forwarder();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != characteristic {
                    continue;
                }
                trace!("BLE RX <- {}", format_hex(&notification.value));
                if payloads.send(notification.value).is_err() {
                    break;
                }
            }
            debug!("BLE notification stream ended");
        }));
        self.characteristic = Some(target);

        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn unsubscribe(&mut self) -> Result<(), TransportError> {
        self.stop_forwarder();
        if let Some(characteristic) = self.characteristic.take() {
            self.peripheral.unsubscribe(&characteristic).await?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stop_forwarder();
        self.characteristic = None;
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

impl Drop for BleSession {
    fn drop(&mut self) {
        self.stop_forwarder();
    }
}
