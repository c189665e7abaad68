//! Collision-free destination naming.
//!
//! Every document staged in a run gets a destination filename that is
//! neither already reserved in this run nor (unless explicitly overwritten)
//! already present on disk. Two strategies are available:
//!
//! ## Preserve-name
//!
//! The source filename is reused as-is. Collisions are resolved by policy:
//!
//! - Name already claimed earlier in this run → the newcomer is skipped.
//!   Traversal order is deterministic, so the same file always wins.
//! - Name already recorded in the store (pre-reserved) → skipped.
//! - File already on disk from a previous run → overwritten, or, under
//!   [`ConflictPolicy::PreferRicher`], kept when it carries strictly more
//!   metadata than the newcomer.
//!
//! ## Rewrite-name
//!
//! Names are composed from metadata and a run-scoped counter:
//!
//! ```text
//! paris/20230714_001.jpg   → paris_2023_1.jpg
//! 20190102_x.png           → 2019_2.png
//! lisbon/holiday.jpg       → lisbon_3.jpg
//! untitled.gif             → untitled_4.gif
//! ```
//!
//! The counter only moves forward and is skipped past any candidate that is
//! taken. It lives in the [`Namer`], so independent runs never share it.

use crate::types::PhotoDocument;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// How destination names are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingStrategy {
    PreserveName(ConflictPolicy),
    RewriteName,
}

impl Default for NamingStrategy {
    fn default() -> Self {
        Self::PreserveName(ConflictPolicy::default())
    }
}

/// What to do when a preserved name is taken by a file that was already in
/// the destination before this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    Overwrite,
    /// Keep the existing file if it has strictly more metadata.
    PreferRicher,
}

/// Why a document did not get a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another document already claimed the name in this run.
    ClaimedThisRun,
    /// The name is already recorded in the target collection.
    AlreadyRecorded,
    /// The file on disk carries more metadata than the newcomer.
    RicherOccupant,
}

/// Outcome of [`Namer::assign`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameDecision {
    /// Name is free.
    Fresh(String),
    /// Name belongs to a pre-existing destination file that will be replaced.
    Overwrite(String),
    Skip { name: String, reason: SkipReason },
}

impl NameDecision {
    /// The name to stage under, if any.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Fresh(name) | Self::Overwrite(name) => Some(name),
            Self::Skip { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occupant {
    /// Claimed by a document staged in this run.
    Staged,
    /// Already present in the store before the run began.
    Recorded,
}

/// Run-scoped record of destination names already claimed.
#[derive(Debug, Default)]
pub struct CollisionSet {
    reserved: HashMap<String, Occupant>,
}

impl CollisionSet {
    pub fn contains(&self, name: &str) -> bool {
        self.reserved.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.reserved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserved.is_empty()
    }

    fn get(&self, name: &str) -> Option<Occupant> {
        self.reserved.get(name).copied()
    }

    fn claim(&mut self, name: &str) {
        self.reserved.insert(name.to_string(), Occupant::Staged);
    }

    fn record(&mut self, name: String) {
        self.reserved.entry(name).or_insert(Occupant::Recorded);
    }
}

/// Assigns destination names for one run.
#[derive(Debug)]
pub struct Namer {
    strategy: NamingStrategy,
    counter: u64,
    collisions: CollisionSet,
}

impl Namer {
    pub fn new(strategy: NamingStrategy) -> Self {
        Self::with_counter(strategy, 1)
    }

    /// Start the rewrite counter at `start` instead of 1.
    pub fn with_counter(strategy: NamingStrategy, start: u64) -> Self {
        Self {
            strategy,
            counter: start,
            collisions: CollisionSet::default(),
        }
    }

    pub fn strategy(&self) -> NamingStrategy {
        self.strategy
    }

    /// Next counter value the rewrite strategy will try.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn collisions(&self) -> &CollisionSet {
        &self.collisions
    }

    /// Mark names that already exist in the store.
    pub fn reserve_recorded(&mut self, names: impl IntoIterator<Item = String>) {
        for name in names {
            self.collisions.record(name);
        }
    }

    /// Choose a destination name for `candidate`.
    ///
    /// `candidate.name` holds the source filename. `on_disk` reports whether
    /// a name is already taken in the destination, returning the occupant's
    /// metadata richness (see [`PhotoDocument::richness`]).
    pub fn assign(
        &mut self,
        candidate: &PhotoDocument,
        on_disk: impl Fn(&str) -> Option<u8>,
    ) -> NameDecision {
        match self.strategy {
            NamingStrategy::PreserveName(policy) => self.preserve(candidate, policy, on_disk),
            NamingStrategy::RewriteName => self.rewrite(candidate, on_disk),
        }
    }

    fn preserve(
        &mut self,
        candidate: &PhotoDocument,
        policy: ConflictPolicy,
        on_disk: impl Fn(&str) -> Option<u8>,
    ) -> NameDecision {
        let name = candidate.name.clone();
        if let Some(occupant) = self.collisions.get(&name) {
            let reason = match occupant {
                Occupant::Staged => SkipReason::ClaimedThisRun,
                Occupant::Recorded => SkipReason::AlreadyRecorded,
            };
            return NameDecision::Skip { name, reason };
        }

        let Some(existing) = on_disk(&name) else {
            self.collisions.claim(&name);
            return NameDecision::Fresh(name);
        };

        if policy == ConflictPolicy::PreferRicher && existing > candidate.richness() {
            return NameDecision::Skip {
                name,
                reason: SkipReason::RicherOccupant,
            };
        }
        self.collisions.claim(&name);
        NameDecision::Overwrite(name)
    }

    fn rewrite(
        &mut self,
        candidate: &PhotoDocument,
        on_disk: impl Fn(&str) -> Option<u8>,
    ) -> NameDecision {
        let (base, ext) = rewrite_parts(candidate);
        let mut n = self.counter;
        loop {
            let name = format!("{base}_{n}{ext}");
            n += 1;
            if !self.collisions.contains(&name) && on_disk(&name).is_none() {
                self.counter = n;
                self.collisions.claim(&name);
                return NameDecision::Fresh(name);
            }
        }
    }
}

/// Split a candidate into the `{city}_{year}` base (or the original stem)
/// and the original extension including its dot.
fn rewrite_parts(candidate: &PhotoDocument) -> (String, String) {
    let source = Path::new(&candidate.name);
    let ext = source
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let parts: Vec<String> = candidate
        .city
        .iter()
        .cloned()
        .chain(candidate.year.map(|y| y.to_string()))
        .collect();

    let base = if parts.is_empty() {
        source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| candidate.name.clone())
    } else {
        parts.join("_")
    };
    (base, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assigned_names(decisions: &[NameDecision]) -> Vec<&str> {
        decisions.iter().filter_map(NameDecision::name).collect()
    }

    fn all_unique<'a>(names: impl IntoIterator<Item = &'a str>) -> bool {
        let mut seen = HashSet::new();
        names.into_iter().all(|n| seen.insert(n))
    }

    fn doc(name: &str, year: Option<i32>, city: Option<&str>) -> PhotoDocument {
        PhotoDocument::new(name, year, city.map(String::from))
    }

    fn empty_disk(_: &str) -> Option<u8> {
        None
    }

    // =========================================================================
    // Rewrite strategy
    // =========================================================================

    #[test]
    fn rewrite_composes_city_year_counter() {
        let mut namer = Namer::new(NamingStrategy::RewriteName);
        let d = namer.assign(&doc("20230714_001.jpg", Some(2023), Some("paris")), empty_disk);
        assert_eq!(d, NameDecision::Fresh("paris_2023_1.jpg".into()));
    }

    #[test]
    fn rewrite_omits_missing_components() {
        let mut namer = Namer::new(NamingStrategy::RewriteName);
        let a = namer.assign(&doc("20190102_x.png", Some(2019), None), empty_disk);
        let b = namer.assign(&doc("holiday.jpg", None, Some("lisbon")), empty_disk);
        assert_eq!(a.name(), Some("2019_1.png"));
        assert_eq!(b.name(), Some("lisbon_2.jpg"));
    }

    #[test]
    fn rewrite_falls_back_to_stem() {
        let mut namer = Namer::new(NamingStrategy::RewriteName);
        let d = namer.assign(&doc("untitled.gif", None, None), empty_disk);
        assert_eq!(d.name(), Some("untitled_1.gif"));
    }

    #[test]
    fn rewrite_preserves_extension_case() {
        let mut namer = Namer::new(NamingStrategy::RewriteName);
        let d = namer.assign(&doc("IMG.JPG", Some(2001), None), empty_disk);
        assert_eq!(d.name(), Some("2001_1.JPG"));
    }

    #[test]
    fn rewrite_skips_names_on_disk() {
        let mut namer = Namer::new(NamingStrategy::RewriteName);
        let taken = |n: &str| (n == "paris_2023_1.jpg" || n == "paris_2023_2.jpg").then_some(0);
        let d = namer.assign(&doc("a.jpg", Some(2023), Some("paris")), taken);
        assert_eq!(d.name(), Some("paris_2023_3.jpg"));
        assert_eq!(namer.counter(), 4);
    }

    #[test]
    fn rewrite_skips_recorded_names() {
        let mut namer = Namer::new(NamingStrategy::RewriteName);
        namer.reserve_recorded(["2020_1.jpg".to_string()]);
        let d = namer.assign(&doc("20200101_a.jpg", Some(2020), None), empty_disk);
        assert_eq!(d.name(), Some("2020_2.jpg"));
    }

    #[test]
    fn rewrite_counter_is_per_namer() {
        let mut first = Namer::new(NamingStrategy::RewriteName);
        first.assign(&doc("a.jpg", None, None), empty_disk);
        first.assign(&doc("b.jpg", None, None), empty_disk);

        let mut second = Namer::new(NamingStrategy::RewriteName);
        let d = second.assign(&doc("a.jpg", None, None), empty_disk);
        assert_eq!(d.name(), Some("a_1.jpg"));
    }

    #[test]
    fn rewrite_is_reproducible_for_same_input() {
        let input = vec![
            doc("20230714_001.jpg", Some(2023), Some("paris")),
            doc("20230714_002.jpg", Some(2023), Some("paris")),
            doc("x.png", None, None),
            doc("20100101_y.png", Some(2010), None),
        ];
        let run = || {
            let mut namer = Namer::new(NamingStrategy::RewriteName);
            input
                .iter()
                .map(|d| namer.assign(d, empty_disk))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    // =========================================================================
    // Preserve strategy
    // =========================================================================

    #[test]
    fn preserve_keeps_source_name() {
        let mut namer = Namer::new(NamingStrategy::default());
        let d = namer.assign(&doc("20230714_001.jpg", Some(2023), None), empty_disk);
        assert_eq!(d, NameDecision::Fresh("20230714_001.jpg".into()));
    }

    #[test]
    fn preserve_skips_second_claim_in_run() {
        let mut namer = Namer::new(NamingStrategy::default());
        namer.assign(&doc("a.jpg", Some(2001), Some("paris")), empty_disk);
        let d = namer.assign(&doc("a.jpg", Some(2002), Some("rome")), empty_disk);
        assert_eq!(
            d,
            NameDecision::Skip {
                name: "a.jpg".into(),
                reason: SkipReason::ClaimedThisRun
            }
        );
    }

    #[test]
    fn preserve_overwrites_existing_file() {
        let mut namer = Namer::new(NamingStrategy::PreserveName(ConflictPolicy::Overwrite));
        let d = namer.assign(&doc("a.jpg", None, None), |_| Some(2));
        assert_eq!(d, NameDecision::Overwrite("a.jpg".into()));
    }

    #[test]
    fn prefer_richer_keeps_richer_occupant() {
        let mut namer = Namer::new(NamingStrategy::PreserveName(ConflictPolicy::PreferRicher));
        let d = namer.assign(&doc("a.jpg", None, None), |_| Some(2));
        assert_eq!(
            d,
            NameDecision::Skip {
                name: "a.jpg".into(),
                reason: SkipReason::RicherOccupant
            }
        );
    }

    #[test]
    fn prefer_richer_overwrites_equal_or_poorer_occupant() {
        let mut namer = Namer::new(NamingStrategy::PreserveName(ConflictPolicy::PreferRicher));
        let d = namer.assign(&doc("a.jpg", Some(2001), None), |_| Some(1));
        assert_eq!(d, NameDecision::Overwrite("a.jpg".into()));
    }

    #[test]
    fn preserve_skips_recorded_names() {
        let mut namer = Namer::new(NamingStrategy::default());
        namer.reserve_recorded(["a.jpg".to_string()]);
        let d = namer.assign(&doc("a.jpg", Some(2001), None), empty_disk);
        assert!(matches!(
            d,
            NameDecision::Skip {
                reason: SkipReason::AlreadyRecorded,
                ..
            }
        ));
    }

    #[test]
    fn assigned_names_are_unique() {
        let mut namer = Namer::new(NamingStrategy::default());
        let decisions: Vec<_> = ["a.jpg", "b.jpg", "a.jpg", "c.jpg", "b.jpg"]
            .iter()
            .map(|n| namer.assign(&doc(n, None, None), empty_disk))
            .collect();
        let names = assigned_names(&decisions);
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert!(all_unique(names));
        assert_eq!(namer.collisions().len(), 3);
    }
}
