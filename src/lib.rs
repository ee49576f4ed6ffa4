//! panel-cut-2d is an optimizer library that lays out rectangular cut parts on
//! fixed-size stock sheets with as little waste as possible, accounting for the
//! material lost to the saw kerf. It runs many randomized packing attempts and
//! keeps the best layout it finds.

#![deny(missing_docs)]

mod search;
mod sheet;

#[cfg(test)]
mod tests;

use fnv::FnvHashSet;
use rand::prelude::*;
use search::{compact_sheets, pack_parts, refine_sheets, score_sheets, shuffle_near_equal_areas};
use thiserror::Error as ThisError;

use std::cmp;
use std::fmt;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

pub use sheet::{PlacedPart, SheetLayout};

const REFINE_ROUNDS: usize = 3;

/// Scoring strategy used by the placement engine when no exact fit exists.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Strategy {
    /// Prefer the free rectangle whose shorter leftover side is smallest.
    BestShortSideFit,

    /// Prefer the free rectangle whose leftover area is smallest.
    BestAreaFit,

    /// Prefer the free rectangle whose longer leftover side is smallest.
    BestLongSideFit,
}

impl Strategy {
    /// Resolves a strategy tag. Recognized tags are `"BSSF"`, `"BAF"` and
    /// `"BLSF"`; anything else falls back to `BestShortSideFit`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "BSSF" => Strategy::BestShortSideFit,
            "BAF" => Strategy::BestAreaFit,
            "BLSF" => Strategy::BestLongSideFit,
            _ => Strategy::BestShortSideFit,
        }
    }

    /// Primary two-element key of the scored placement pass, smaller is better.
    pub(crate) fn primary_key(self, leftover_width: usize, leftover_height: usize) -> (u64, u64) {
        let short_side = cmp::min(leftover_width, leftover_height) as u64;
        let long_side = cmp::max(leftover_width, leftover_height) as u64;
        let area_left = leftover_width as u64 * leftover_height as u64;

        match self {
            Strategy::BestShortSideFit => (short_side, area_left),
            Strategy::BestAreaFit => (area_left, short_side),
            Strategy::BestLongSideFit => (long_side, short_side),
        }
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::BestShortSideFit
    }
}

/// A rectangular piece that needs to be cut from stock sheets.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct CutPiece {
    /// Width of this rectangular cut piece.
    pub width: usize,

    /// Height of this rectangular cut piece.
    pub height: usize,

    /// How many copies of this piece are required.
    pub quantity: usize,
}

/// A single canonical part, flattened out of a [`CutPiece`] quantity and named
/// `P1, P2, …` in flattening order. Immutable after creation.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    width: usize,
    height: usize,
    name: String,
}

impl Part {
    pub(crate) fn new(width: usize, height: usize, name: String) -> Self {
        Part {
            width,
            height,
            name,
        }
    }

    /// Intrinsic width of the part.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Intrinsic height of the part.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Identifier assigned at flattening time.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}x{})", self.name, self.width, self.height)
    }
}

/// Error while packing parts into sheets.
#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    /// A part does not fit into an empty sheet in any permitted orientation.
    #[error("part {name} ({width}x{height}) does not fit the {sheet_width}x{sheet_height} sheet")]
    OversizedPart {
        /// Name of the offending part.
        name: String,

        /// Intrinsic width of the offending part.
        width: usize,

        /// Intrinsic height of the offending part.
        height: usize,

        /// Width of the stock sheet.
        sheet_width: usize,

        /// Height of the stock sheet.
        sheet_height: usize,
    },
}

/// Convenience alias for packing results.
pub type Result<T> = std::result::Result<T, Error>;

/// Optimizer for laying out rectangular cut pieces on fixed-size stock sheets.
///
/// Runs a configurable number of independent attempts, each of which first-fit
/// packs a randomized ordering of the parts and then improves the result by
/// migrating parts between sheets and re-packing the most wasteful sheets. The
/// attempt with the fewest sheets (ties broken by least scrap) wins.
pub struct Optimizer {
    sheet_width: usize,
    sheet_height: usize,
    kerf: usize,
    strategy: Strategy,
    allow_rotation: bool,
    attempts: usize,
    random_seed: u64,
    cut_pieces: Vec<CutPiece>,
}

impl Optimizer {
    /// Creates an optimizer for the given stock sheet size.
    pub fn new(sheet_width: usize, sheet_height: usize) -> Self {
        Optimizer {
            sheet_width,
            sheet_height,
            kerf: 0,
            strategy: Strategy::default(),
            allow_rotation: true,
            attempts: 50,
            random_seed: 0,
            cut_pieces: Vec::new(),
        }
    }

    /// Add a cut piece that needs to be cut from the stock sheets.
    pub fn add_cut_piece(&mut self, cut_piece: CutPiece) -> &mut Self {
        self.cut_pieces.push(cut_piece);
        self
    }

    /// Add cut pieces that need to be cut from the stock sheets.
    pub fn add_cut_pieces<I>(&mut self, cut_pieces: I) -> &mut Self
    where
        I: IntoIterator<Item = CutPiece>,
    {
        self.cut_pieces.extend(cut_pieces);
        self
    }

    /// Set the width of the cut between placements. This represents the blade
    /// or kerf thickness; it defaults to zero.
    pub fn set_kerf(&mut self, kerf: usize) -> &mut Self {
        self.kerf = kerf;
        self
    }

    /// Set the scoring strategy used by the placement engine.
    pub fn set_strategy(&mut self, strategy: Strategy) -> &mut Self {
        self.strategy = strategy;
        self
    }

    /// Set whether the optimizer is allowed to rotate parts 90 degrees to make
    /// them fit. Defaults to `true`.
    pub fn set_allow_rotation(&mut self, allow_rotation: bool) -> &mut Self {
        self.allow_rotation = allow_rotation;
        self
    }

    /// Set how many independent randomized attempts to run. Defaults to 50;
    /// zero attempts yield an empty layout list.
    pub fn set_attempts(&mut self, attempts: usize) -> &mut Self {
        self.attempts = attempts;
        self
    }

    /// Set the random seed used by the randomized shuffles. Using the same
    /// seed gives the same result for the same input.
    pub fn set_random_seed(&mut self, seed: u64) -> &mut Self {
        self.random_seed = seed;
        self
    }

    /// Runs the optimizer and returns the best layout found, one
    /// [`SheetLayout`] per stock sheet used.
    ///
    /// Returns an empty list when `attempts` is zero or when a part cannot fit
    /// an empty sheet in any permitted orientation.
    pub fn optimize(&self) -> Vec<SheetLayout> {
        self.optimize_with_progress(|_| {})
    }

    /// Like [`Optimizer::optimize`], reporting the fraction of attempts
    /// completed through `progress_callback`.
    pub fn optimize_with_progress<F>(&self, progress_callback: F) -> Vec<SheetLayout>
    where
        F: Fn(f64),
    {
        let base = self.flatten_cut_pieces();
        if self.attempts == 0 || self.any_oversized(&base) {
            return Vec::new();
        }

        let mut rng: StdRng = SeedableRng::seed_from_u64(self.random_seed);
        let mut best: Option<((usize, u64), Vec<SheetLayout>)> = None;

        for attempt in 0..self.attempts {
            let mut parts = base.clone();
            parts.sort_by_key(|part| cmp::Reverse(part.area()));
            shuffle_near_equal_areas(&mut parts, &mut rng);

            if let Ok(mut sheets) = pack_parts(
                &parts,
                self.sheet_width,
                self.sheet_height,
                self.kerf,
                self.strategy,
                self.allow_rotation,
            ) {
                compact_sheets(&mut sheets, self.strategy, self.allow_rotation);
                refine_sheets(
                    &mut sheets,
                    self.sheet_width,
                    self.sheet_height,
                    self.kerf,
                    self.strategy,
                    self.allow_rotation,
                    REFINE_ROUNDS,
                    &mut rng,
                );

                let attempt_score = score_sheets(&sheets);
                if best
                    .as_ref()
                    .map_or(true, |(best_score, _)| attempt_score < *best_score)
                {
                    best = Some((attempt_score, sheets));
                }
            }

            progress_callback((attempt + 1) as f64 / self.attempts as f64);
        }

        best.map(|(_, sheets)| sheets).unwrap_or_default()
    }

    fn flatten_cut_pieces(&self) -> Vec<Part> {
        let mut parts = Vec::new();
        let mut counter = 1;
        for cut_piece in &self.cut_pieces {
            for _ in 0..cut_piece.quantity {
                parts.push(Part::new(
                    cut_piece.width,
                    cut_piece.height,
                    format!("P{}", counter),
                ));
                counter += 1;
            }
        }
        parts
    }

    fn fits_sheet(&self, part: &Part) -> bool {
        part.width() <= self.sheet_width && part.height() <= self.sheet_height
            || self.allow_rotation
                && part.height() <= self.sheet_width
                && part.width() <= self.sheet_height
    }

    // An oversized part dooms every attempt the same way, so the distinct
    // dimensions are checked once up front instead of once per attempt.
    fn any_oversized(&self, parts: &[Part]) -> bool {
        let mut seen: FnvHashSet<(usize, usize)> = Default::default();
        parts
            .iter()
            .any(|part| seen.insert((part.width(), part.height())) && !self.fits_sheet(part))
    }
}

/// Lays out a `(width, height, quantity)` piece list on stock sheets of the
/// given size and returns the best layout found across `attempts` randomized
/// attempts.
///
/// `strategy_tag` is one of `"BSSF"`, `"BAF"` or `"BLSF"`; unknown tags fall
/// back to `"BSSF"`. An empty list is returned when `attempts` is zero or when
/// a piece cannot fit an empty sheet in any permitted orientation.
pub fn optimize(
    sheet_width: usize,
    sheet_height: usize,
    kerf: usize,
    piece_list: &[(usize, usize, usize)],
    strategy_tag: &str,
    allow_rotation: bool,
    attempts: usize,
) -> Vec<SheetLayout> {
    let mut optimizer = Optimizer::new(sheet_width, sheet_height);
    optimizer
        .add_cut_pieces(
            piece_list
                .iter()
                .map(|&(width, height, quantity)| CutPiece {
                    width,
                    height,
                    quantity,
                }),
        )
        .set_kerf(kerf)
        .set_strategy(Strategy::from_tag(strategy_tag))
        .set_allow_rotation(allow_rotation)
        .set_attempts(attempts);
    optimizer.optimize()
}
