use std::net::Ipv4Addr;
use std::sync::Mutex;

/// Shared position of the address walk.
///
/// The current address is held as a `u32` behind a mutex; callers only ever
/// receive copies. Each successful `next` call observes a distinct value, no
/// matter how many tasks call it concurrently.
#[derive(Debug)]
pub struct AddressCursor {
    current: Mutex<u32>,
}

impl AddressCursor {
    pub fn new(start: Ipv4Addr) -> Self {
        Self {
            current: Mutex::new(u32::from(start)),
        }
    }

    /// Step one address forward (`increment == true`) or backward.
    ///
    /// Returns `None` once the step would land on `0.0.0.0` or
    /// `255.255.255.255`; the position is left untouched in that case, so the
    /// cursor stays exhausted in that direction.
    pub fn next(&self, increment: bool) -> Option<Ipv4Addr> {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let candidate = if increment {
            current.checked_add(1)?
        } else {
            current.checked_sub(1)?
        };
        if candidate == u32::MIN || candidate == u32::MAX {
            return None;
        }
        *current = candidate;
        Some(Ipv4Addr::from(candidate))
    }

    /// Copy of the current position.
    pub fn position(&self) -> Ipv4Addr {
        let current = match self.current.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        };
        Ipv4Addr::from(current)
    }
}
