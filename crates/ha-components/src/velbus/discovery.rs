//! Partitioning scanned modules into platform categories

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::controller::VelbusModule;

/// Platforms a Velbus channel can be exposed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Switch,
    Sensor,
    BinarySensor,
    Cover,
    Climate,
}

impl Category {
    /// Every category, in forwarding order
    pub const ALL: [Category; 5] = [
        Category::Switch,
        Category::Sensor,
        Category::BinarySensor,
        Category::Cover,
        Category::Climate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Switch => "switch",
            Category::Sensor => "sensor",
            Category::BinarySensor => "binary_sensor",
            Category::Cover => "cover",
            Category::Climate => "climate",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (module address, channel) pairs per category, from one scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverySnapshot {
    channels: HashMap<Category, Vec<(u8, u8)>>,
}

impl DiscoverySnapshot {
    /// Modules are visited in the given order and channels ascending, so the
    /// pairs of each category keep that order.
    pub fn from_modules(modules: &[Arc<dyn VelbusModule>]) -> Self {
        let mut channels: HashMap<Category, Vec<(u8, u8)>> =
            Category::ALL.into_iter().map(|c| (c, Vec::new())).collect();

        for module in modules {
            for channel in 1..=module.number_of_channels() {
                let declared = module.categories(channel);
                for category in Category::ALL {
                    if declared.iter().any(|d| d == category.as_str()) {
                        if let Some(pairs) = channels.get_mut(&category) {
                            pairs.push((module.address(), channel));
                        }
                    }
                }
            }
        }

        Self { channels }
    }

    pub fn channels(&self, category: Category) -> &[(u8, u8)] {
        self.channels
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of (address, channel) pairs across categories
    pub fn len(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
