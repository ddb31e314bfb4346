//! Per-faction presence extraction.
//!
//! A frame is classified against a typed table of per-faction color rules.
//! Each rule is an inclusive RGB range; a pixel belongs to a faction exactly
//! when all three channels fall inside that faction's range.

use std::collections::BTreeMap;
use std::path::Path;

use caster_models::Faction;
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{VisionError, VisionResult};
use crate::frame::Frame;

/// Per-faction presence masks for one frame. Factions with no pixels are absent.
pub type PresenceMap = BTreeMap<Faction, PresenceMask>;

/// Inclusive per-channel RGB range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ClassificationRule {
    /// Create a new rule.
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    /// Rule accepting `rgb` plus or minus `tolerance` on every channel.
    pub fn around(rgb: [u8; 3], tolerance: u8) -> Self {
        let mut lower = [0u8; 3];
        let mut upper = [0u8; 3];
        for c in 0..3 {
            lower[c] = rgb[c].saturating_sub(tolerance);
            upper[c] = rgb[c].saturating_add(tolerance);
        }
        Self { lower, upper }
    }

    /// Whether the pixel falls inside the range.
    #[inline]
    pub fn matches(&self, px: [u8; 3]) -> bool {
        (0..3).all(|c| px[c] >= self.lower[c] && px[c] <= self.upper[c])
    }

    /// Lower bound does not exceed upper bound on any channel.
    pub fn is_valid(&self) -> bool {
        (0..3).all(|c| self.lower[c] <= self.upper[c])
    }

    /// Two ranges overlap when every channel interval overlaps.
    pub fn overlaps(&self, other: &ClassificationRule) -> bool {
        (0..3).all(|c| self.lower[c] <= other.upper[c] && other.lower[c] <= self.upper[c])
    }
}

/// Typed faction → rule table, validated at load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationTable {
    rules: BTreeMap<Faction, ClassificationRule>,
}

impl ClassificationTable {
    /// Build and validate a table.
    pub fn new(rules: BTreeMap<Faction, ClassificationRule>) -> VisionResult<Self> {
        let table = Self { rules };
        table.validate()?;
        Ok(table)
    }

    /// Rules around each faction's nominal marker color.
    pub fn default_palette() -> Self {
        let rules = Faction::ALL
            .iter()
            .map(|f| (*f, ClassificationRule::around(f.display_rgb(), 40)))
            .collect();
        Self { rules }
    }

    /// Parse and validate a JSON table (`{"red": {"lower": [..], "upper": [..]}, ...}`).
    pub fn from_json_str(json: &str) -> VisionResult<Self> {
        let rules: BTreeMap<Faction, ClassificationRule> = serde_json::from_str(json)?;
        Self::new(rules)
    }

    /// Load and validate a JSON table from disk.
    pub fn load(path: impl AsRef<Path>) -> VisionResult<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Check every rule is well-formed and the table is non-empty.
    ///
    /// Overlapping rules are allowed but logged, since pixels in the overlap
    /// are attributed to both factions.
    pub fn validate(&self) -> VisionResult<()> {
        if self.rules.is_empty() {
            return Err(VisionError::invalid_rule("classification table is empty"));
        }
        for (faction, rule) in &self.rules {
            if !rule.is_valid() {
                return Err(VisionError::invalid_rule(format!(
                    "{faction}: lower {:?} exceeds upper {:?}",
                    rule.lower, rule.upper
                )));
            }
        }
        let entries: Vec<_> = self.rules.iter().collect();
        for (i, (fa, ra)) in entries.iter().enumerate() {
            for (fb, rb) in entries.iter().skip(i + 1) {
                if ra.overlaps(rb) {
                    warn!("Classification rules for {} and {} overlap", fa, fb);
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, faction: Faction) -> Option<&ClassificationRule> {
        self.rules.get(&faction)
    }

    pub fn factions(&self) -> impl Iterator<Item = Faction> + '_ {
        self.rules.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for ClassificationTable {
    fn default() -> Self {
        Self::default_palette()
    }
}

/// Where one faction's markers appear in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceMask {
    /// Row-major `(height, width)` grid
    cells: Array2<bool>,
    count: usize,
}

impl PresenceMask {
    /// Wrap a boolean grid.
    pub fn from_cells(cells: Array2<bool>) -> Self {
        let count = cells.iter().filter(|v| **v).count();
        Self { cells, count }
    }

    pub fn cells(&self) -> &Array2<bool> {
        &self.cells
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn width(&self) -> usize {
        self.cells.ncols()
    }

    pub fn height(&self) -> usize {
        self.cells.nrows()
    }

    /// Whether pixel `(x, y)` is set.
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.cells.get((y, x)).copied().unwrap_or(false)
    }

    /// Grid as 0.0 / 1.0 floats for density work.
    pub fn to_density(&self) -> Array2<f32> {
        self.cells.mapv(|v| if v { 1.0 } else { 0.0 })
    }
}

/// Classifies frames into per-faction presence masks.
#[derive(Debug, Clone)]
pub struct PresenceExtractor {
    table: ClassificationTable,
}

impl PresenceExtractor {
    /// Create an extractor for a validated table.
    pub fn new(table: ClassificationTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ClassificationTable {
        &self.table
    }

    /// Classify a frame.
    ///
    /// Pure function of the frame and the table. A malformed frame yields an
    /// empty map; factions without a single matching pixel are omitted.
    pub fn extract(&self, frame: &Frame) -> PresenceMap {
        if frame.is_malformed() {
            debug!("Skipping presence extraction for malformed frame {}", frame.seq());
            return PresenceMap::new();
        }

        let (w, h) = (frame.width() as usize, frame.height() as usize);
        self.table
            .rules
            .par_iter()
            .filter_map(|(faction, rule)| {
                let cells = Array2::from_shape_fn((h, w), |(y, x)| {
                    rule.matches(frame.rgb(x as u32, y as u32))
                });
                let mask = PresenceMask::from_cells(cells);
                (mask.count() > 0).then_some((*faction, mask))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn two_faction_table() -> ClassificationTable {
        let mut rules = BTreeMap::new();
        rules.insert(Faction::Red, ClassificationRule::new([200, 0, 0], [255, 60, 60]));
        rules.insert(Faction::Blue, ClassificationRule::new([0, 0, 200], [60, 90, 255]));
        ClassificationTable::new(rules).unwrap()
    }

    #[test]
    fn test_rule_matching_is_inclusive() {
        let rule = ClassificationRule::new([10, 20, 30], [10, 40, 50]);
        assert!(rule.matches([10, 20, 30]));
        assert!(rule.matches([10, 40, 50]));
        assert!(!rule.matches([11, 30, 40]));
        assert!(!rule.matches([10, 19, 40]));
    }

    #[test]
    fn test_invalid_rule_rejected() {
        let mut rules = BTreeMap::new();
        rules.insert(Faction::Red, ClassificationRule::new([200, 0, 0], [100, 60, 60]));
        assert!(matches!(
            ClassificationTable::new(rules),
            Err(VisionError::InvalidRule(_))
        ));
        assert!(ClassificationTable::new(BTreeMap::new()).is_err());
    }

    #[test]
    fn test_table_from_json() {
        let json = r#"{"red": {"lower": [200, 0, 0], "upper": [255, 60, 60]},
                       "teal": {"lower": [0, 180, 150], "upper": [60, 255, 220]}}"#;
        let table = ClassificationTable::from_json_str(json).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.get(Faction::Teal).is_some());

        assert!(ClassificationTable::from_json_str(r#"{"magenta": {"lower": [0,0,0], "upper": [1,1,1]}}"#).is_err());
    }

    #[test]
    fn test_default_palette_is_disjoint() {
        let table = ClassificationTable::default_palette();
        assert_eq!(table.len(), Faction::ALL.len());
        let rules: Vec<_> = table.factions().map(|f| *table.get(f).unwrap()).collect();
        for (i, a) in rules.iter().enumerate() {
            for b in rules.iter().skip(i + 1) {
                assert!(!a.overlaps(b));
            }
        }
    }

    #[test]
    fn test_extract_blocks() {
        let mut frame = Frame::filled(40, 30, [0, 0, 0]);
        frame.paint(2, 2, 5, 4, [230, 20, 20]);
        frame.paint(20, 10, 3, 3, [20, 60, 240]);

        let presence = PresenceExtractor::new(two_faction_table()).extract(&frame);
        assert_eq!(presence.len(), 2);
        assert_eq!(presence[&Faction::Red].count(), 20);
        assert_eq!(presence[&Faction::Blue].count(), 9);
        assert!(presence[&Faction::Red].get(3, 3));
        assert!(!presence[&Faction::Red].get(20, 10));
    }

    #[test]
    fn test_extract_empty_frame() {
        let frame = Frame::from_raw(0, 0, Vec::new()).unwrap();
        assert!(PresenceExtractor::new(two_faction_table()).extract(&frame).is_empty());

        let black = Frame::filled(10, 10, [0, 0, 0]);
        assert!(PresenceExtractor::new(two_faction_table()).extract(&black).is_empty());
    }

    #[test]
    fn test_never_attributes_out_of_range_pixels() {
        let table = ClassificationTable::default_palette();
        let extractor = PresenceExtractor::new(table.clone());
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..25 {
            let mut frame = Frame::filled(48, 48, [0, 0, 0]);
            for _ in 0..12 {
                let rgb = [rng.random(), rng.random(), rng.random()];
                let x = rng.random_range(0..44);
                let y = rng.random_range(0..44);
                let size = rng.random_range(1..5);
                frame.paint(x, y, size, size, rgb);
            }
            // Also drop in exact marker colors so masks are not trivially empty.
            frame.paint(0, 0, 3, 3, Faction::Green.display_rgb());

            let presence = extractor.extract(&frame);
            for (faction, mask) in &presence {
                let rule = table.get(*faction).unwrap();
                for y in 0..48 {
                    for x in 0..48 {
                        if mask.get(x, y) {
                            assert!(rule.matches(frame.rgb(x as u32, y as u32)));
                        }
                    }
                }
            }
            assert!(presence.contains_key(&Faction::Green));
        }
    }
}
