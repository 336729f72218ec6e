//! Every pump the console is connected to, one of them selected.

use std::collections::BTreeMap;
use std::time::Duration;

use log::info;
use serialport::SerialPort;

use crate::virtual_pump::{VirtualPump, VIRTUAL_PORT};
use crate::{find_serial_device, parse_probe, send_command, ConsoleError};

pub enum Link {
    Serial(Box<dyn SerialPort>),
    Virtual(VirtualPump),
}

impl Link {
    pub fn kind(&self) -> &'static str {
        match self {
            Link::Serial(_) => "serial",
            Link::Virtual(_) => "virtual",
        }
    }

    pub fn send(&mut self, line: &str) -> Result<String, ConsoleError> {
        match self {
            Link::Serial(port) => send_command(line, port),
            Link::Virtual(pump) => send_command(line, pump),
        }
    }
}

pub struct Session {
    baud: u32,
    timeout: Duration,
    links: BTreeMap<String, Link>,
    active: Option<String>,
}

impl Session {
    pub fn new(baud: u32, timeout: Duration) -> Self {
        Session { baud, timeout, links: BTreeMap::new(), active: None }
    }

    /// Connects to `virtual`, a port name or a USB `vid:pid`, and selects it.
    /// Returns the name the pump is listed under.
    pub fn connect(&mut self, target: &str) -> Result<String, ConsoleError> {
        let target = target.trim();
        let name = if target == VIRTUAL_PORT || parse_probe(target).is_none() {
            target.to_owned()
        } else {
            find_serial_device(target).ok_or_else(|| ConsoleError::NoDevice(target.to_owned()))?
        };
        if self.links.contains_key(&name) {
            return Err(ConsoleError::PortInUse(name));
        }

        let link = if name == VIRTUAL_PORT {
            Link::Virtual(VirtualPump::default())
        } else {
            let port = serialport::new(&name, self.baud).timeout(self.timeout).open().map_err(ConsoleError::Open)?;
            Link::Serial(port)
        };
        info!("connected {} pump on {}", link.kind(), name);
        self.links.insert(name.clone(), link);
        self.active = Some(name.clone());
        Ok(name)
    }

    /// Drops the named pump, or the selected one. Another pump gets selected.
    pub fn disconnect(&mut self, name: Option<&str>) -> Result<String, ConsoleError> {
        let name = match name {
            Some(name) => name.to_owned(),
            None => self.active.clone().ok_or(ConsoleError::NoPumpSelected)?,
        };
        self.links.remove(&name).ok_or_else(|| ConsoleError::NotConnected(name.clone()))?;
        info!("disconnected {}", name);
        if self.active.as_deref() == Some(name.as_str()) {
            self.active = self.links.keys().next().cloned();
        }
        Ok(name)
    }

    pub fn select(&mut self, name: &str) -> Result<(), ConsoleError> {
        if !self.links.contains_key(name) {
            return Err(ConsoleError::NotConnected(name.to_owned()));
        }
        self.active = Some(name.to_owned());
        Ok(())
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Name and link kind of every connected pump, in name order.
    pub fn pumps(&self) -> impl Iterator<Item = (&str, &'static str)> + '_ {
        self.links.iter().map(|(name, link)| (name.as_str(), link.kind()))
    }

    pub fn send(&mut self, line: &str) -> Result<String, ConsoleError> {
        let name = self.active.as_ref().ok_or(ConsoleError::NoPumpSelected)?;
        let link = self.links.get_mut(name).ok_or_else(|| ConsoleError::NotConnected(name.clone()))?;
        link.send(line)
    }
}
