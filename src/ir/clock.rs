//! Clock classes and the clock-class priority map.

use serde::{Deserialize, Serialize};

use super::ClockClassHandle;

const NS_PER_S: i128 = 1_000_000_000;

fn default_frequency() -> u64 {
    1_000_000_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockClass {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Cycles per second.
    #[serde(default = "default_frequency")]
    pub frequency: u64,
    #[serde(default)]
    pub precision: u64,
    #[serde(default)]
    pub offset_s: i64,
    #[serde(default)]
    pub offset_cycles: u64,
    #[serde(default)]
    pub is_absolute: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl ClockClass {
    pub fn new(name: &str, frequency: u64) -> Self {
        Self {
            name: name.to_string(),
            description: None,
            frequency,
            precision: 0,
            offset_s: 0,
            offset_cycles: 0,
            is_absolute: false,
            uuid: None,
        }
    }

    fn cycles_to_ns(&self, cycles: i128) -> i128 {
        if self.frequency == NS_PER_S as u64 {
            cycles
        } else {
            cycles * NS_PER_S / self.frequency as i128
        }
    }

    /// Converts a raw cycle value to nanoseconds since the Unix epoch.
    /// Returns `None` for a zero frequency or when the result overflows.
    pub fn ns_from_epoch(&self, cycles: u64) -> Option<i64> {
        if self.frequency == 0 {
            return None;
        }

        let ns = self.offset_s as i128 * NS_PER_S
            + self.cycles_to_ns(self.offset_cycles as i128 + cycles as i128);

        i64::try_from(ns).ok()
    }

    /// Shifts the clock origin by a user-supplied offset.
    pub fn apply_offset(&mut self, offset_s: i64, offset_ns: i64) {
        let extra_s = offset_ns.div_euclid(NS_PER_S as i64);
        let rem_ns = offset_ns.rem_euclid(NS_PER_S as i64) as i128;

        self.offset_s = self.offset_s.saturating_add(offset_s).saturating_add(extra_s);

        if rem_ns != 0 && self.frequency != 0 {
            let cycles = rem_ns * self.frequency as i128 / NS_PER_S;
            self.offset_cycles = self.offset_cycles.saturating_add(cycles as u64);
        }
    }
}

/// A raw clock value along with the clock class it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub clock: ClockClassHandle,
    pub cycles: u64,
    pub ns_from_epoch: Option<i64>,
}

/// Tie-break priorities of the clock classes of one trace.
///
/// A lower value means a higher priority.
#[derive(Debug, Clone, Default)]
pub struct ClockClassPriorityMap {
    priorities: Vec<(ClockClassHandle, u64)>,
    highest: Option<ClockClassHandle>,
}

impl ClockClassPriorityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the priority of `clock`. The first clock class having the lowest
    /// value becomes the highest-priority clock class.
    pub fn add(&mut self, clock: ClockClassHandle, priority: u64) {
        match self.priorities.iter_mut().find(|(c, _)| *c == clock) {
            Some((_, p)) => *p = priority,
            None => self.priorities.push((clock, priority)),
        }

        self.highest = self
            .priorities
            .iter()
            .fold(None::<(ClockClassHandle, u64)>, |best, &(c, p)| match best {
                Some((_, bp)) if bp <= p => best,
                _ => Some((c, p)),
            })
            .map(|(c, _)| c);
    }

    pub fn priority(&self, clock: ClockClassHandle) -> Option<u64> {
        self.priorities
            .iter()
            .find(|(c, _)| *c == clock)
            .map(|(_, p)| *p)
    }

    pub fn highest_priority(&self) -> Option<ClockClassHandle> {
        self.highest
    }

    pub fn len(&self) -> usize {
        self.priorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_from_epoch() {
        let mut cc = ClockClass::new("monotonic", 1_000_000_000);
        assert_eq!(cc.ns_from_epoch(42), Some(42));

        cc.offset_s = 10;
        assert_eq!(cc.ns_from_epoch(42), Some(10_000_000_042));

        let mut slow = ClockClass::new("slow", 1000);
        slow.offset_cycles = 500;
        assert_eq!(slow.ns_from_epoch(500), Some(1_000_000_000));

        let broken = ClockClass::new("broken", 0);
        assert_eq!(broken.ns_from_epoch(1), None);
    }

    #[test]
    fn test_apply_offset() {
        let mut cc = ClockClass::new("monotonic", 1_000_000_000);
        cc.apply_offset(2, 1_500_000_000);
        assert_eq!(cc.offset_s, 3);
        assert_eq!(cc.offset_cycles, 500_000_000);
        assert_eq!(cc.ns_from_epoch(0), Some(3_500_000_000));

        let mut cc = ClockClass::new("monotonic", 1_000_000_000);
        cc.apply_offset(0, -1);
        assert_eq!(cc.ns_from_epoch(0), Some(-1));
    }

    #[test]
    fn test_priority_map() {
        let mut map = ClockClassPriorityMap::new();
        assert_eq!(map.highest_priority(), None);

        map.add(ClockClassHandle(0), 0);
        map.add(ClockClassHandle(1), 0);
        assert_eq!(map.highest_priority(), Some(ClockClassHandle(0)));

        map.add(ClockClassHandle(1), 0);
        map.add(ClockClassHandle(0), 3);
        assert_eq!(map.highest_priority(), Some(ClockClassHandle(1)));
        assert_eq!(map.priority(ClockClassHandle(0)), Some(3));
        assert_eq!(map.len(), 2);
    }
}
