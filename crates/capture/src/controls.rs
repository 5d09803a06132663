//! Named access to V4L2 controls.

use anyhow::{Result, anyhow};
use v4l::{
    Device,
    control::{Control, Description, Type, Value},
};

/// Lowercase `name` and squash every run of other characters into `_`,
/// so "Exposure (Absolute)" and "exposure_absolute" find the same control.
pub fn control_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
        } else if !key.is_empty() && !key.ends_with('_') {
            key.push('_');
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    key
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInfo {
    pub id: u32,
    pub name: String,
    pub minimum: i64,
    pub maximum: i64,
    pub step: i64,
    pub default: i64,
    pub boolean: bool,
}

impl ControlInfo {
    pub fn clamp(&self, value: i64) -> i64 {
        value.clamp(self.minimum, self.maximum)
    }

    /// `current` moved by `steps` increments, kept in range.
    pub fn adjusted(&self, current: i64, steps: i64) -> i64 {
        self.clamp(current.saturating_add(steps.saturating_mul(self.step)))
    }

    /// A neighbouring legal value, used to force the driver to apply a
    /// value it believes is already set.
    pub fn nudge(&self, value: i64) -> i64 {
        if value.saturating_add(self.step) <= self.maximum {
            value + self.step
        } else {
            self.clamp(value - self.step)
        }
    }

    fn from_description(desc: &Description) -> Option<Self> {
        let boolean = match desc.typ {
            Type::Boolean => true,
            Type::Integer | Type::Integer64 | Type::Menu | Type::IntegerMenu => false,
            _ => return None,
        };
        Some(Self {
            id: desc.id,
            name: desc.name.clone(),
            minimum: desc.minimum,
            maximum: desc.maximum,
            step: i64::try_from(desc.step).unwrap_or(1).max(1),
            default: desc.default,
            boolean,
        })
    }
}

/// The adjustable controls a device reports.
#[derive(Debug, Clone, Default)]
pub struct ControlTable {
    controls: Vec<ControlInfo>,
}

impl From<&[Description]> for ControlTable {
    fn from(descriptions: &[Description]) -> Self {
        Self {
            controls: descriptions
                .iter()
                .filter_map(ControlInfo::from_description)
                .collect(),
        }
    }
}

impl FromIterator<ControlInfo> for ControlTable {
    fn from_iter<I: IntoIterator<Item = ControlInfo>>(iter: I) -> Self {
        Self {
            controls: iter.into_iter().collect(),
        }
    }
}

impl ControlTable {
    pub fn find(&self, name: &str) -> Option<&ControlInfo> {
        let key = control_key(name);
        self.controls.iter().find(|c| control_key(&c.name) == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlInfo> {
        self.controls.iter()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

pub fn read_control(device: &Device, info: &ControlInfo) -> Result<i64> {
    let control = device.control(info.id)?;
    match control.value {
        Value::Integer(value) => Ok(value),
        Value::Boolean(value) => Ok(i64::from(value)),
        other => Err(anyhow!("control '{}' has unexpected value {:?}", info.name, other)),
    }
}

pub fn write_control(device: &Device, info: &ControlInfo, value: i64) -> Result<()> {
    let value = if info.boolean {
        Value::Boolean(value != 0)
    } else {
        Value::Integer(info.clamp(value))
    };
    device.set_control(Control { id: info.id, value })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zoom() -> ControlInfo {
        ControlInfo {
            id: 0x009a090d,
            name: "Zoom, Absolute".into(),
            minimum: 100,
            maximum: 500,
            step: 10,
            default: 100,
            boolean: false,
        }
    }

    #[test]
    fn keys_ignore_case_and_punctuation() {
        assert_eq!(control_key("Exposure (Absolute)"), "exposure_absolute");
        assert_eq!(control_key("White Balance Temperature, Auto"), "white_balance_temperature_auto");
        assert_eq!(control_key("  brightness "), "brightness");
        assert_eq!(control_key("focus_absolute"), "focus_absolute");
    }

    #[test]
    fn adjust_moves_in_steps_and_clamps() {
        let zoom = zoom();
        assert_eq!(zoom.adjusted(200, 3), 230);
        assert_eq!(zoom.adjusted(480, 5), 500);
        assert_eq!(zoom.adjusted(120, -10), 100);
    }

    #[test]
    fn nudge_stays_in_range() {
        let zoom = zoom();
        assert_eq!(zoom.nudge(200), 210);
        assert_eq!(zoom.nudge(500), 490);
    }

    #[test]
    fn table_finds_by_either_spelling() {
        let table: ControlTable = [zoom()].into_iter().collect();
        assert_eq!(table.find("zoom_absolute").map(|c| c.id), Some(0x009a090d));
        assert_eq!(table.find("Zoom, Absolute").map(|c| c.id), Some(0x009a090d));
        assert!(table.find("focus_absolute").is_none());
        assert_eq!(table.len(), 1);
    }
}
