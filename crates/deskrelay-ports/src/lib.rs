//! Port band allocator
//!
//! Hands out free ports from three disjoint numeric bands (debug, vnc,
//! display), avoiding any port currently reserved by a tracked session. All
//! three bands live behind one mutex so concurrent allocations are atomic:
//! two concurrent calls can never return the same port.

use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// The three independent reservation bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortBand {
    /// DevTools debug ports
    Debug,
    /// VNC protocol ports
    Vnc,
    /// X display numbers
    Display,
}

impl std::fmt::Display for PortBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PortBand::Debug => "debug",
            PortBand::Vnc => "vnc",
            PortBand::Display => "display",
        };
        f.write_str(s)
    }
}

/// Port allocation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("no free port left in the {band} band")]
    Exhausted { band: PortBand },

    #[error("port {port} is already reserved in the {band} band")]
    Conflict { band: PortBand, port: u16 },
}

/// Inclusive range a band allocates from
#[derive(Debug, Clone, Copy)]
pub struct BandRange {
    pub start: u16,
    pub end: u16,
}

impl BandRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Number of ports in the band
    pub fn capacity(&self) -> usize {
        (self.end - self.start) as usize + 1
    }
}

#[derive(Debug)]
struct BandState {
    range: BandRange,
    reserved: HashSet<u16>,
}

impl BandState {
    fn new(range: BandRange) -> Self {
        Self {
            range,
            reserved: HashSet::new(),
        }
    }

    fn lowest_free(&self) -> Option<u16> {
        (self.range.start..=self.range.end).find(|port| !self.reserved.contains(port))
    }
}

#[derive(Debug)]
struct Bands {
    debug: BandState,
    vnc: BandState,
    display: BandState,
}

impl Bands {
    fn band_mut(&mut self, band: PortBand) -> &mut BandState {
        match band {
            PortBand::Debug => &mut self.debug,
            PortBand::Vnc => &mut self.vnc,
            PortBand::Display => &mut self.display,
        }
    }

    fn band(&self, band: PortBand) -> &BandState {
        match band {
            PortBand::Debug => &self.debug,
            PortBand::Vnc => &self.vnc,
            PortBand::Display => &self.display,
        }
    }
}

/// Allocator over the three port bands
///
/// Reservations are released only when the owning session stops; releasing an
/// unreserved port is a no-op, not an error.
#[derive(Debug)]
pub struct PortAllocator {
    bands: Mutex<Bands>,
}

impl PortAllocator {
    pub fn new(debug: BandRange, vnc: BandRange, display: BandRange) -> Self {
        Self {
            bands: Mutex::new(Bands {
                debug: BandState::new(debug),
                vnc: BandState::new(vnc),
                display: BandState::new(display),
            }),
        }
    }

    /// Allocate the lowest free port in the band
    ///
    /// Reserves the port atomically with respect to concurrent calls.
    pub fn allocate(&self, band: PortBand) -> Result<u16, PortError> {
        let mut bands = self.bands.lock().unwrap();
        let state = bands.band_mut(band);

        let port = state
            .lowest_free()
            .ok_or(PortError::Exhausted { band })?;
        state.reserved.insert(port);

        debug!(%band, port, "allocated port");
        Ok(port)
    }

    /// Reserve a specific known port (used when adopting discovered sessions)
    ///
    /// Ports outside the configured band are accepted and tracked; a port
    /// already reserved is a conflict, surfaced rather than overwritten.
    pub fn reserve(&self, band: PortBand, port: u16) -> Result<(), PortError> {
        let mut bands = self.bands.lock().unwrap();
        let state = bands.band_mut(band);

        if !state.reserved.insert(port) {
            return Err(PortError::Conflict { band, port });
        }

        debug!(%band, port, "reserved port");
        Ok(())
    }

    /// Release a reservation; idempotent
    pub fn release(&self, band: PortBand, port: u16) {
        let mut bands = self.bands.lock().unwrap();
        if bands.band_mut(band).reserved.remove(&port) {
            debug!(%band, port, "released port");
        }
    }

    /// Whether a port is currently reserved in the band
    pub fn is_reserved(&self, band: PortBand, port: u16) -> bool {
        self.bands.lock().unwrap().band(band).reserved.contains(&port)
    }

    /// Number of reservations currently held in the band
    pub fn reserved_count(&self, band: PortBand) -> usize {
        self.bands.lock().unwrap().band(band).reserved.len()
    }

    /// The configured range of the band
    pub fn range(&self, band: PortBand) -> BandRange {
        self.bands.lock().unwrap().band(band).range
    }
}
