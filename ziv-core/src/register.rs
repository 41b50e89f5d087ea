//! The closed set of meter registers the driver can read
//!
//! Every register maps to a fixed COSEM Register object (class 3, attribute 2)
//! on the meter. The table below is the only place that knows addresses,
//! units and scalers; adding a register is a data change here.

use crate::obis_code::ObisCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical quantity of a register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    /// Cumulative counter, never negative
    Energy,
    /// Instantaneous value, the meter may report it signed
    Power,
}

/// Canonical unit of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "Wh")]
    WattHour,
    #[serde(rename = "W")]
    Watt,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::WattHour => "Wh",
            Unit::Watt => "W",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Meter register identifier
///
/// The declaration order is the polling order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RegisterId {
    ImportActiveEnergy,
    ExportActiveEnergy,
    ImportActivePower,
    ExportActivePower,
}

/// Static description of one register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    pub id: RegisterId,
    pub name: &'static str,
    pub obis: ObisCode,
    /// COSEM interface class of the object
    pub class_id: u16,
    /// Attribute holding the value
    pub attribute: u8,
    pub quantity: Quantity,
    pub unit: Unit,
    /// Power of ten applied to the raw value to reach `unit`
    pub scaler: i8,
}

/// COSEM interface class 3 (Register)
pub const REGISTER_CLASS_ID: u16 = 3;

/// Register attribute 2 (value)
pub const VALUE_ATTRIBUTE: u8 = 2;

static REGISTERS: [RegisterSpec; RegisterId::COUNT] = [
    RegisterSpec {
        id: RegisterId::ImportActiveEnergy,
        name: "import_active_energy",
        obis: ObisCode::new(1, 0, 1, 8, 0, 255),
        class_id: REGISTER_CLASS_ID,
        attribute: VALUE_ATTRIBUTE,
        quantity: Quantity::Energy,
        unit: Unit::WattHour,
        scaler: 0,
    },
    RegisterSpec {
        id: RegisterId::ExportActiveEnergy,
        name: "export_active_energy",
        obis: ObisCode::new(1, 0, 2, 8, 0, 255),
        class_id: REGISTER_CLASS_ID,
        attribute: VALUE_ATTRIBUTE,
        quantity: Quantity::Energy,
        unit: Unit::WattHour,
        scaler: 0,
    },
    // The 5CTM reports power in decawatts
    RegisterSpec {
        id: RegisterId::ImportActivePower,
        name: "import_active_power",
        obis: ObisCode::new(1, 0, 1, 7, 0, 255),
        class_id: REGISTER_CLASS_ID,
        attribute: VALUE_ATTRIBUTE,
        quantity: Quantity::Power,
        unit: Unit::Watt,
        scaler: 1,
    },
    RegisterSpec {
        id: RegisterId::ExportActivePower,
        name: "export_active_power",
        obis: ObisCode::new(1, 0, 2, 7, 0, 255),
        class_id: REGISTER_CLASS_ID,
        attribute: VALUE_ATTRIBUTE,
        quantity: Quantity::Power,
        unit: Unit::Watt,
        scaler: 1,
    },
];

impl RegisterId {
    /// Number of known registers
    pub const COUNT: usize = 4;

    /// All registers in polling order
    pub const ALL: [RegisterId; RegisterId::COUNT] = [
        RegisterId::ImportActiveEnergy,
        RegisterId::ExportActiveEnergy,
        RegisterId::ImportActivePower,
        RegisterId::ExportActivePower,
    ];

    /// Position in the polling order
    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn spec(self) -> &'static RegisterSpec {
        &REGISTERS[self.ordinal()]
    }

    pub fn obis(self) -> ObisCode {
        self.spec().obis
    }

    pub fn quantity(self) -> Quantity {
        self.spec().quantity
    }

    pub fn unit(self) -> Unit {
        self.spec().unit
    }

    pub fn scaler(self) -> i8 {
        self.spec().scaler
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// Invoke id carried by GET requests for this register
    ///
    /// Invoke ids are 4 bits on the wire and 0 is avoided, so each register
    /// gets `ordinal + 1`.
    pub fn invoke_id(self) -> u8 {
        self.ordinal() as u8 + 1
    }

    /// Register answered by a response carrying `invoke_id`
    pub fn from_invoke_id(invoke_id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.invoke_id() == invoke_id)
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Set of enabled registers
///
/// Iteration always follows the polling order, whatever order registers
/// were inserted in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<RegisterId>", into = "Vec<RegisterId>")]
pub struct RegisterSet {
    enabled: [bool; RegisterId::COUNT],
}

impl RegisterSet {
    /// Empty set: nothing is polled
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            enabled: [true; RegisterId::COUNT],
        }
    }

    pub fn insert(&mut self, register: RegisterId) {
        self.enabled[register.ordinal()] = true;
    }

    pub fn remove(&mut self, register: RegisterId) {
        self.enabled[register.ordinal()] = false;
    }

    pub fn contains(&self, register: RegisterId) -> bool {
        self.enabled[register.ordinal()]
    }

    pub fn is_empty(&self) -> bool {
        !self.enabled.iter().any(|&e| e)
    }

    pub fn len(&self) -> usize {
        self.enabled.iter().filter(|&&e| e).count()
    }

    /// Enabled registers in polling order
    pub fn iter(&self) -> impl Iterator<Item = RegisterId> + '_ {
        RegisterId::ALL.into_iter().filter(|r| self.contains(*r))
    }
}

impl FromIterator<RegisterId> for RegisterSet {
    fn from_iter<I: IntoIterator<Item = RegisterId>>(iter: I) -> Self {
        let mut set = Self::new();
        for register in iter {
            set.insert(register);
        }
        set
    }
}

impl From<Vec<RegisterId>> for RegisterSet {
    fn from(registers: Vec<RegisterId>) -> Self {
        registers.into_iter().collect()
    }
}

impl From<RegisterSet> for Vec<RegisterId> {
    fn from(set: RegisterSet) -> Self {
        set.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_ids() {
        for register in RegisterId::ALL {
            assert_eq!(register.spec().id, register);
        }
        assert_eq!(
            RegisterId::ImportActiveEnergy.obis(),
            ObisCode::new(1, 0, 1, 8, 0, 255)
        );
        assert_eq!(RegisterId::ExportActivePower.obis().to_string(), "1.0.2.7.0.255");
        assert_eq!(RegisterId::ImportActivePower.scaler(), 1);
        assert_eq!(RegisterId::ExportActiveEnergy.unit(), Unit::WattHour);
    }

    #[test]
    fn test_invoke_id_round_trip() {
        for register in RegisterId::ALL {
            let id = register.invoke_id();
            assert!((1..=15).contains(&id));
            assert_eq!(RegisterId::from_invoke_id(id), Some(register));
        }
        assert_eq!(RegisterId::from_invoke_id(0), None);
        assert_eq!(RegisterId::from_invoke_id(9), None);
    }

    #[test]
    fn test_register_set_iterates_in_poll_order() {
        let set: RegisterSet = [
            RegisterId::ExportActivePower,
            RegisterId::ImportActiveEnergy,
            RegisterId::ImportActivePower,
        ]
        .into_iter()
        .collect();

        let order: Vec<_> = set.iter().collect();
        assert_eq!(
            order,
            vec![
                RegisterId::ImportActiveEnergy,
                RegisterId::ImportActivePower,
                RegisterId::ExportActivePower,
            ]
        );
        assert_eq!(set.len(), 3);
        assert!(!set.contains(RegisterId::ExportActiveEnergy));
    }

    #[test]
    fn test_register_set_empty() {
        let mut set = RegisterSet::new();
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
        set.insert(RegisterId::ExportActiveEnergy);
        set.remove(RegisterId::ExportActiveEnergy);
        assert!(set.is_empty());
        assert_eq!(RegisterSet::all().len(), 4);
    }
}
