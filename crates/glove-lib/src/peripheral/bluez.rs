//! BlueZ transport over the system D-Bus
//!
//! Uses the blocking `dbus` connection. Each link owns its own connection so
//! notifications for one glove are only ever dispatched on the thread that
//! reads from it.

use super::{decode_capacitance, BleAdapter, PeripheralConfig, PeripheralLink};
use crate::error::{GloveError, Result};
use crate::models::SensorFrame;
use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use dbus::arg::{PropMap, RefArg, Variant};
use dbus::blocking::stdintf::org_freedesktop_dbus::{
    ObjectManager, Properties, PropertiesPropertiesChanged as PropertiesChanged,
};
use dbus::blocking::Connection;
use dbus::message::SignalArgs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const BLUEZ: &str = "org.bluez";
const ADAPTER_IFACE: &str = "org.bluez.Adapter1";
const DEVICE_IFACE: &str = "org.bluez.Device1";
const SERVICE_IFACE: &str = "org.bluez.GattService1";
const CHARACTERISTIC_IFACE: &str = "org.bluez.GattCharacteristic1";

const CALL_TIMEOUT: Duration = Duration::from_secs(5);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RESOLVE_POLL: Duration = Duration::from_millis(100);

/// Host Bluetooth controller managed by BlueZ
pub struct BluezAdapter {
    conn: Connection,
    adapter_path: String,
    config: PeripheralConfig,
}

impl BluezAdapter {
    /// Attach to the configured controller and power it on
    pub fn new(config: &PeripheralConfig) -> Result<Self> {
        let conn = Connection::new_system()?;
        let adapter_path = format!("/org/bluez/{}", config.adapter);

        let proxy = conn.with_proxy(BLUEZ, &adapter_path, CALL_TIMEOUT);
        proxy.method_call::<(), _, _, _>(
            "org.freedesktop.DBus.Properties",
            "Set",
            (ADAPTER_IFACE, "Powered", Variant(true)),
        )?;
        debug!(adapter = %config.adapter, "Bluetooth adapter powered");

        Ok(Self {
            conn,
            adapter_path,
            config: config.clone(),
        })
    }

    fn managed_objects(&self) -> Result<Vec<(String, PropMap)>> {
        let proxy = self.conn.with_proxy(BLUEZ, "/", CALL_TIMEOUT);
        let objects = proxy.get_managed_objects()?;

        Ok(objects
            .into_iter()
            .filter_map(|(path, mut interfaces)| {
                let path = path.to_string();
                if !path.starts_with(&self.adapter_path) {
                    return None;
                }
                interfaces.remove(DEVICE_IFACE).map(|props| (path, props))
            })
            .collect())
    }

    fn is_glove(&self, props: &PropMap) -> bool {
        let named = ["Name", "Alias"]
            .iter()
            .filter_map(|key| prop_str(props, key))
            .any(|name| name == self.config.advertised_name);

        named
            || prop_strings(props, "UUIDs")
                .iter()
                .any(|uuid| uuid.eq_ignore_ascii_case(&self.config.service_uuid))
    }
}

impl BleAdapter for BluezAdapter {
    fn discover(&self, timeout: Duration) -> Result<Vec<String>> {
        let proxy = self.conn.with_proxy(BLUEZ, &self.adapter_path, CALL_TIMEOUT);
        proxy.method_call::<(), _, _, _>(ADAPTER_IFACE, "StartDiscovery", ())?;

        std::thread::sleep(timeout);

        if let Err(e) = proxy.method_call::<(), _, _, _>(ADAPTER_IFACE, "StopDiscovery", ()) {
            debug!(error = %e, "StopDiscovery failed");
        }

        let mut addresses: Vec<String> = self
            .managed_objects()?
            .into_iter()
            .filter(|(_, props)| self.is_glove(props))
            .filter_map(|(_, props)| prop_str(&props, "Address"))
            .collect();
        addresses.sort();

        Ok(addresses)
    }

    fn connect(&self, address: &str) -> Result<Box<dyn PeripheralLink>> {
        let link = BluezLink::open(&self.adapter_path, address, &self.config)?;
        Ok(Box::new(link))
    }
}

/// Connected glove streaming capacitance notifications
pub struct BluezLink {
    conn: Connection,
    address: String,
    device_path: String,
    data_path: String,
    frames: Receiver<SensorFrame>,
    link_lost: Arc<AtomicBool>,
}

impl BluezLink {
    fn open(adapter_path: &str, address: &str, config: &PeripheralConfig) -> Result<Self> {
        let conn = Connection::new_system()?;
        let device_path = format!("{}/dev_{}", adapter_path, address.replace(':', "_"));

        let device = conn.with_proxy(BLUEZ, &device_path, CONNECT_TIMEOUT);
        device.method_call::<(), _, _, _>(DEVICE_IFACE, "Connect", ())?;
        wait_services_resolved(&conn, &device_path)?;

        let characteristics = service_characteristics(&conn, &device_path, &config.service_uuid)?;
        let data_path = characteristics
            .first()
            .cloned()
            .ok_or_else(|| {
                GloveError::Transport(format!("{} exposes no data characteristic", address))
            })?;

        match characteristics
            .iter()
            .find(|path| value_handle(path) == Some(config.sampling_rate_handle))
        {
            Some(rate_path) => {
                let proxy = conn.with_proxy(BLUEZ, rate_path, CALL_TIMEOUT);
                proxy.method_call::<(), _, _, _>(
                    CHARACTERISTIC_IFACE,
                    "WriteValue",
                    (vec![config.sampling_rate_hz], PropMap::new()),
                )?;
                debug!(
                    address = %address,
                    rate_hz = config.sampling_rate_hz,
                    "Sampling rate configured"
                );
            }
            None => warn!(
                address = %address,
                handle = config.sampling_rate_handle,
                "Sampling-rate characteristic not found, keeping device default"
            ),
        }

        let (tx, rx) = unbounded();
        let link_lost = Arc::new(AtomicBool::new(false));
        let lost_flag = Arc::clone(&link_lost);
        let watched_data = data_path.clone();
        let watched_device = device_path.clone();

        conn.add_match(
            PropertiesChanged::match_rule(None, None),
            move |pc: PropertiesChanged, _, msg| {
                let path = msg.path().map(|p| p.to_string());
                if path.as_deref() == Some(watched_data.as_str()) {
                    if let Some(value) = pc.changed_properties.get("Value") {
                        let _ = tx.send(decode_capacitance(&variant_bytes(value)));
                    }
                } else if path.as_deref() == Some(watched_device.as_str()) {
                    let connected = pc
                        .changed_properties
                        .get("Connected")
                        .and_then(|v| v.0.as_u64());
                    if connected == Some(0) {
                        lost_flag.store(true, Ordering::SeqCst);
                    }
                }
                true
            },
        )?;

        let data = conn.with_proxy(BLUEZ, &data_path, CALL_TIMEOUT);
        data.method_call::<(), _, _, _>(CHARACTERISTIC_IFACE, "StartNotify", ())?;
        info!(address = %address, characteristic = %data_path, "Notifications enabled");

        Ok(Self {
            conn,
            address: address.to_string(),
            device_path,
            data_path,
            frames: rx,
            link_lost,
        })
    }
}

impl PeripheralLink for BluezLink {
    fn address(&self) -> &str {
        &self.address
    }

    fn raw_read(&mut self, timeout: Duration) -> Result<Option<SensorFrame>> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.frames.try_recv() {
                Ok(frame) => return Ok(Some(frame)),
                Err(TryRecvError::Disconnected) => return Err(GloveError::Disconnected),
                Err(TryRecvError::Empty) => {}
            }
            if self.link_lost.load(Ordering::SeqCst) {
                return Err(GloveError::Disconnected);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.conn.process(remaining)?;
        }
    }

    fn close(&mut self) -> Result<()> {
        let data = self.conn.with_proxy(BLUEZ, &self.data_path, CALL_TIMEOUT);
        if let Err(e) = data.method_call::<(), _, _, _>(CHARACTERISTIC_IFACE, "StopNotify", ()) {
            debug!(error = %e, "StopNotify failed");
        }

        let device = self.conn.with_proxy(BLUEZ, &self.device_path, CALL_TIMEOUT);
        device.method_call::<(), _, _, _>(DEVICE_IFACE, "Disconnect", ())?;
        Ok(())
    }
}

fn wait_services_resolved(conn: &Connection, device_path: &str) -> Result<()> {
    let proxy = conn.with_proxy(BLUEZ, device_path, CALL_TIMEOUT);
    let deadline = Instant::now() + CONNECT_TIMEOUT;

    while Instant::now() < deadline {
        if proxy.get::<bool>(DEVICE_IFACE, "ServicesResolved")? {
            return Ok(());
        }
        std::thread::sleep(RESOLVE_POLL);
    }

    Err(GloveError::Transport(format!(
        "services of {} not resolved within {:?}",
        device_path, CONNECT_TIMEOUT
    )))
}

/// Characteristic object paths of the glove service, in handle order
fn service_characteristics(
    conn: &Connection,
    device_path: &str,
    service_uuid: &str,
) -> Result<Vec<String>> {
    let proxy = conn.with_proxy(BLUEZ, "/", CALL_TIMEOUT);
    let objects = proxy.get_managed_objects()?;

    let service_path = objects
        .iter()
        .find(|(path, interfaces)| {
            path.starts_with(device_path)
                && interfaces
                    .get(SERVICE_IFACE)
                    .and_then(|props| prop_str(props, "UUID"))
                    .map_or(false, |uuid| uuid.eq_ignore_ascii_case(service_uuid))
        })
        .map(|(path, _)| path.to_string())
        .ok_or_else(|| GloveError::Transport(format!("service {} not found", service_uuid)))?;

    let mut characteristics: Vec<String> = objects
        .iter()
        .filter(|(_, interfaces)| {
            interfaces
                .get(CHARACTERISTIC_IFACE)
                .and_then(|props| props.get("Service"))
                .and_then(|service| service.0.as_str())
                == Some(service_path.as_str())
        })
        .map(|(path, _)| path.to_string())
        .collect();
    characteristics.sort();

    Ok(characteristics)
}

/// ATT value handle of a characteristic, from its `charXXXX` declaration handle
fn value_handle(path: &str) -> Option<u16> {
    let hex = path.rsplit('/').next()?.strip_prefix("char")?;
    u16::from_str_radix(hex, 16)
        .ok()
        .and_then(|declaration| declaration.checked_add(1))
}

fn prop_str(props: &PropMap, key: &str) -> Option<String> {
    props.get(key)?.0.as_str().map(str::to_string)
}

fn prop_strings(props: &PropMap, key: &str) -> Vec<String> {
    props
        .get(key)
        .and_then(|value| value.0.as_iter())
        .map(|items| items.filter_map(|item| item.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn variant_bytes(value: &Variant<Box<dyn RefArg>>) -> Vec<u8> {
    value
        .0
        .as_iter()
        .map(|items| items.filter_map(|item| item.as_u64().map(|b| b as u8)).collect())
        .unwrap_or_default()
}
