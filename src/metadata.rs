//! Metadata extraction from filenames and directory layout.
//!
//! Two fields are recovered without opening the file:
//!
//! ## Capture year
//!
//! Camera and phone exports embed the capture date as an 8-digit token:
//! `IMG_20230714_101500.jpg`, `PXL-20190102-003.png`. The year is the first
//! four digits of the first such token that falls in the accepted range.
//!
//! The token must be a *maximal* run of exactly eight digits. A substring
//! search would happily read `2023` out of `120230714999`, which is a
//! counter, not a date, so runs shorter or longer than eight are ignored
//! entirely.
//!
//! ## City
//!
//! Photos are grouped by the folder they were dropped into:
//!
//! ```text
//! source/
//! ├── paris/
//! │   └── 20230714_001.jpg   → city = "paris"
//! ├── lisbon/old/x.jpg       → no city (strict) / "lisbon" (nested)
//! └── root_photo.png         → no city
//! ```
//!
//! All functions here are pure. Absence is `None`, never an error.

use chrono::Datelike;
use rand::Rng;
use rand::seq::SliceRandom;
use std::path::{Component, Path};

/// Earliest capture year accepted by default.
pub const MIN_YEAR: i32 = 1970;

/// Length of the date token (`YYYYMMDD`).
const DATE_TOKEN_LEN: usize = 8;

/// Range of decoys generated around the true year by [`year_options`].
const YEAR_OPTION_SPREAD: i32 = 4;
const YEAR_OPTION_DECOYS: usize = 3;

/// Accepted range for extracted years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearPolicy {
    pub min: i32,
    /// Upper bound (inclusive). `None` accepts any year from `min` on.
    pub max: Option<i32>,
}

impl YearPolicy {
    /// Accept any year from [`MIN_YEAR`] on.
    pub fn permissive() -> Self {
        Self {
            min: MIN_YEAR,
            max: None,
        }
    }

    /// Accept years from [`MIN_YEAR`] up to and including `current_year`.
    pub fn up_to(current_year: i32) -> Self {
        Self {
            min: MIN_YEAR,
            max: Some(current_year),
        }
    }

    pub fn accepts(&self, year: i32) -> bool {
        year >= self.min && self.max.is_none_or(|max| year <= max)
    }
}

impl Default for YearPolicy {
    fn default() -> Self {
        Self::up_to(current_year())
    }
}

/// The current calendar year in local time.
pub fn current_year() -> i32 {
    chrono::Local::now().year()
}

/// How deep below the source root a file may sit and still get a city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CityDepth {
    /// Only `city/file.jpg`.
    #[default]
    DepthOne,
    /// `city/any/number/of/levels/file.jpg`.
    Any,
}

/// Extract the capture year from a filename.
///
/// ```text
/// "20230714_001.jpg"        → Some(2023)
/// "IMG-19991231-x.png"      → Some(1999)
/// "120230714999.jpg"        → None   (12-digit run)
/// "19600101_a_20010203.jpg" → Some(2001) (first token out of range)
/// ```
pub fn extract_year(filename: &str, policy: &YearPolicy) -> Option<i32> {
    digit_runs(filename)
        .filter(|run| run.len() == DATE_TOKEN_LEN)
        .filter_map(|run| run[..4].parse::<i32>().ok())
        .find(|&year| policy.accepts(year))
}

/// Iterate over maximal runs of ASCII digits.
fn digit_runs(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty())
}

/// Extract the city from a file's position below the source root.
///
/// Returns the first path segment relative to `source_root` when the file
/// is nested deep enough (see [`CityDepth`]). Files directly in the root, or
/// outside it, have no city.
pub fn extract_city(source_root: &Path, path: &Path, depth: CityDepth) -> Option<String> {
    let relative = path.strip_prefix(source_root).ok()?;
    let segments: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s),
            _ => None,
        })
        .collect();

    let nested = match depth {
        CityDepth::DepthOne => segments.len() == 2,
        CityDepth::Any => segments.len() >= 2,
    };
    if !nested {
        return None;
    }
    Some(segments[0].to_string_lossy().into_owned())
}

/// Build the multiple-choice year options for a document.
///
/// Returns the true year plus three distinct decoys drawn from
/// `year - 4 ..= year + 4`, in random order.
pub fn year_options<R: Rng + ?Sized>(year: i32, rng: &mut R) -> Vec<i32> {
    let candidates: Vec<i32> = (year - YEAR_OPTION_SPREAD..=year + YEAR_OPTION_SPREAD)
        .filter(|&y| y != year)
        .collect();
    let mut options: Vec<i32> = candidates
        .choose_multiple(rng, YEAR_OPTION_DECOYS)
        .copied()
        .collect();
    options.push(year);
    options.shuffle(rng);
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::path::PathBuf;

    fn year(name: &str) -> Option<i32> {
        extract_year(name, &YearPolicy::up_to(2025))
    }

    // =========================================================================
    // extract_year() tests
    // =========================================================================

    #[test]
    fn year_from_leading_date_token() {
        assert_eq!(year("20230714_001.jpg"), Some(2023));
    }

    #[test]
    fn year_from_dash_delimited_token() {
        assert_eq!(year("IMG-19991231-x.png"), Some(1999));
    }

    #[test]
    fn year_from_underscore_delimited_token() {
        assert_eq!(year("PXL_20190102_003.jpg"), Some(2019));
    }

    #[test]
    fn year_none_without_token() {
        assert_eq!(year("root_photo.png"), None);
        assert_eq!(year("vacation.jpg"), None);
    }

    #[test]
    fn longer_digit_runs_never_match() {
        assert_eq!(year("120230714999.jpg"), None);
        assert_eq!(year("202307141.jpg"), None);
        assert_eq!(year("x_2023071400_y.jpg"), None);
    }

    #[test]
    fn shorter_digit_runs_never_match() {
        assert_eq!(year("2023071_a.jpg"), None);
        assert_eq!(year("2023.jpg"), None);
    }

    #[test]
    fn years_before_1970_are_rejected() {
        assert_eq!(year("19691231_party.jpg"), None);
        assert_eq!(year("19700101_epoch.jpg"), Some(1970));
    }

    #[test]
    fn first_qualifying_token_wins() {
        assert_eq!(year("19600101_a_20010203.jpg"), Some(2001));
        assert_eq!(year("20010203_a_20050607.jpg"), Some(2001));
    }

    #[test]
    fn future_years_rejected_when_bounded() {
        assert_eq!(year("20990101_x.jpg"), None);
        assert_eq!(
            extract_year("20990101_x.jpg", &YearPolicy::permissive()),
            Some(2099)
        );
    }

    #[test]
    fn upper_bound_is_inclusive() {
        assert_eq!(year("20251231_x.jpg"), Some(2025));
    }

    // =========================================================================
    // extract_city() tests
    // =========================================================================

    #[test]
    fn city_from_depth_one_folder() {
        let root = PathBuf::from("/src");
        assert_eq!(
            extract_city(&root, &root.join("paris/20230714_001.jpg"), CityDepth::DepthOne),
            Some("paris".to_string())
        );
    }

    #[test]
    fn no_city_for_root_files() {
        let root = PathBuf::from("/src");
        assert_eq!(
            extract_city(&root, &root.join("root_photo.png"), CityDepth::DepthOne),
            None
        );
        assert_eq!(
            extract_city(&root, &root.join("root_photo.png"), CityDepth::Any),
            None
        );
    }

    #[test]
    fn deeper_nesting_depends_on_policy() {
        let root = PathBuf::from("/src");
        let deep = root.join("lisbon/old/x.jpg");
        assert_eq!(extract_city(&root, &deep, CityDepth::DepthOne), None);
        assert_eq!(
            extract_city(&root, &deep, CityDepth::Any),
            Some("lisbon".to_string())
        );
    }

    #[test]
    fn no_city_outside_root() {
        let root = PathBuf::from("/src");
        assert_eq!(
            extract_city(&root, Path::new("/other/paris/a.jpg"), CityDepth::Any),
            None
        );
    }

    // =========================================================================
    // year_options() tests
    // =========================================================================

    #[test]
    fn year_options_contain_true_year_and_three_distinct_decoys() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let options = year_options(2010, &mut rng);
            assert_eq!(options.len(), 4);
            assert!(options.contains(&2010));
            let mut sorted = options.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 4);
            assert!(options.iter().all(|y| (2006..=2014).contains(y)));
        }
    }

    #[test]
    fn year_options_reproducible_with_seed() {
        let a = year_options(1999, &mut StdRng::seed_from_u64(42));
        let b = year_options(1999, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }
}
