//! Typed readers for known PowerOcean fields
//!
//! The canonical state is loosely typed; these helpers read the fields the
//! hub family is known to report and group them per logical device.

use crate::coordinator::StateSnapshot;
use serde::Serialize;
use std::fmt;

/// Logical device a field belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeviceGroup {
    /// Inverter, battery, PV and grid phases
    PowerOcean,
    /// Heat pump and heating sectors
    PowerHeat,
    /// Heat recovery
    PowerGlow,
    /// EV charger
    PowerPulse,
    /// Historical summary
    PowerHistory,
}

impl DeviceGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PowerOcean => "PowerOcean",
            Self::PowerHeat => "PowerHeat",
            Self::PowerGlow => "PowerGlow",
            Self::PowerPulse => "PowerPulse",
            Self::PowerHistory => "PowerHistory",
        }
    }

    /// Group of a flattened field path, `None` for fields outside the known vocabulary
    pub fn of_field(path: &str, history_key: &str) -> Option<Self> {
        if !history_key.is_empty() && root_segment(path) == history_key {
            return Some(Self::PowerHistory);
        }
        match root_segment(path) {
            "sysLoadPwr" | "sysGridPwr" | "bpSoc" | "bpPwr" | "mpptPwr" | "pcsAPhase"
            | "pcsBPhase" | "pcsCPhase" | "mpptHeartBeat" => Some(Self::PowerOcean),
            "sectorA" | "sectorB" | "sectorDhw" | "hpMaster" | "emsErrCode" => {
                Some(Self::PowerHeat)
            }
            "hrEnergyStream" => Some(Self::PowerGlow),
            "evPwr" | "chargingStatus" | "errorCode" => Some(Self::PowerPulse),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composition key identifying one logical device of one hub
pub fn device_key(serial: &str, group: DeviceGroup) -> String {
    format!("{}_{}", serial, group.as_str())
}

fn root_segment(path: &str) -> &str {
    path.split(['.', '[']).next().unwrap_or(path)
}

/// AC phase of the inverter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    A,
    B,
    C,
}

impl Phase {
    pub fn all() -> [Self; 3] {
        [Self::A, Self::B, Self::C]
    }

    fn root(&self) -> &'static str {
        match self {
            Self::A => "pcsAPhase",
            Self::B => "pcsBPhase",
            Self::C => "pcsCPhase",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PhaseReading {
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub active_power: Option<f64>,
    pub reactive_power: Option<f64>,
    pub apparent_power: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MpptString {
    pub power: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HeatPumpTemps {
    pub inlet: Option<f64>,
    pub outlet: Option<f64>,
    pub ambient: Option<f64>,
}

/// Heating circuits reporting `tempCurr`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatingSector {
    A,
    B,
    DomesticHotWater,
}

impl HeatingSector {
    fn root(&self) -> &'static str {
        match self {
            Self::A => "sectorA",
            Self::B => "sectorB",
            Self::DomesticHotWater => "sectorDhw",
        }
    }
}

const SELF_SUFFICIENCY: &str = "Self-sufficiency";

impl StateSnapshot {
    pub fn system_load_power(&self) -> Option<f64> {
        self.get_f64("sysLoadPwr")
    }

    pub fn grid_power(&self) -> Option<f64> {
        self.get_f64("sysGridPwr")
    }

    pub fn battery_soc(&self) -> Option<f64> {
        self.get_f64("bpSoc")
    }

    pub fn battery_power(&self) -> Option<f64> {
        self.get_f64("bpPwr")
    }

    pub fn pv_power(&self) -> Option<f64> {
        self.get_f64("mpptPwr")
    }

    pub fn phase(&self, phase: Phase) -> PhaseReading {
        let root = phase.root();
        let read = |leaf: &str| self.get_f64(&format!("{}.{}", root, leaf));
        PhaseReading {
            voltage: read("vol"),
            current: read("amp"),
            active_power: read("actPwr"),
            reactive_power: read("reactPwr"),
            apparent_power: read("apparentPwr"),
        }
    }

    pub fn sector_temperature(&self, sector: HeatingSector) -> Option<f64> {
        self.get_f64(&format!("{}.tempCurr", sector.root()))
    }

    pub fn heat_pump_temperatures(&self) -> HeatPumpTemps {
        HeatPumpTemps {
            inlet: self.get_f64("hpMaster.tempInlet"),
            outlet: self.get_f64("hpMaster.tempOutlet"),
            ambient: self.get_f64("hpMaster.tempAmbient"),
        }
    }

    /// Active EMS error codes (empty when none are reported)
    pub fn ems_error_codes(&self) -> Vec<i64> {
        (0..)
            .map_while(|i| self.get(&format!("emsErrCode.errCode[{}]", i)))
            .filter_map(|v| {
                v.as_i64()
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            })
            .collect()
    }

    pub fn heat_recovery_power(&self) -> Option<f64> {
        self.get_f64("hrEnergyStream[0].hrPwr")
    }

    pub fn heat_recovery_temperature(&self) -> Option<f64> {
        self.get_f64("hrEnergyStream[0].temp")
    }

    /// PV string readings from the first MPPT heartbeat
    pub fn mppt_strings(&self) -> Vec<MpptString> {
        (0..)
            .map_while(|i| {
                let root = format!("mpptHeartBeat[0].mpptPv[{}]", i);
                let reading = MpptString {
                    power: self.get_f64(&format!("{}.pwr", root)),
                    voltage: self.get_f64(&format!("{}.vol", root)),
                    current: self.get_f64(&format!("{}.amp", root)),
                };
                let present = self.children(&root).next().is_some();
                present.then_some(reading)
            })
            .collect()
    }

    pub fn ev_power(&self) -> Option<f64> {
        self.get_f64("evPwr")
    }

    pub fn ev_charging_status(&self) -> Option<String> {
        self.get("chargingStatus").map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        })
    }

    pub fn ev_error_code(&self) -> Option<i64> {
        self.get_i64("errorCode")
    }

    /// "Self-sufficiency" index of the historical summary stored under `history_key`
    pub fn self_sufficiency(&self, history_key: &str) -> Option<f64> {
        let base = if history_key.is_empty() {
            "data".to_string()
        } else {
            format!("{}.data", history_key)
        };
        (0..)
            .map_while(|i| {
                let row = format!("{}[{}]", base, i);
                let present = self.children(&row).next().is_some();
                present.then_some(row)
            })
            .find(|row| self.get_str(&format!("{}.indexName", row)) == Some(SELF_SUFFICIENCY))
            .and_then(|row| self.get_f64(&format!("{}.indexValue", row)))
    }

    /// Fields belonging to `group`
    pub fn group_fields(&self, group: DeviceGroup, history_key: &str) -> Vec<(&str, &serde_json::Value)> {
        self.fields
            .iter()
            .filter(|(k, _)| DeviceGroup::of_field(k, history_key) == Some(group))
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }
}
