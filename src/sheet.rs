//! Sheet layout engine: places parts on a single stock sheet by tracking the
//! unoccupied area as a list of (possibly overlapping) free rectangles, in the
//! style of the Maximal Rectangles algorithms.
//! [A Thousand Ways to Pack the Bin](http://pds25.egloos.com/pds/201504/21/98/RectangleBinPack.pdf)

use crate::{Part, Strategy};

use smallvec::SmallVec;

use std::cmp;

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle of currently unoccupied sheet area.
///
/// Members of a sheet's free-rect list may overlap each other; no member is
/// ever contained in another once `merge_free_rects` has run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct FreeRect {
    pub(crate) x: usize,
    pub(crate) y: usize,
    pub(crate) width: usize,
    pub(crate) height: usize,
}

impl FreeRect {
    fn intersects(&self, other: &FreeRect) -> bool {
        !(self.x + self.width <= other.x
            || other.x + other.width <= self.x
            || self.y + self.height <= other.y
            || other.y + other.height <= self.y)
    }

    fn contains(&self, other: &FreeRect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }
}

/// A part that has been placed on a sheet.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug)]
pub struct PlacedPart {
    part: Part,
    x: usize,
    y: usize,
    rotated: bool,
}

impl PlacedPart {
    /// The part occupying this placement.
    pub fn part(&self) -> &Part {
        &self.part
    }

    /// X location of the placement's bottom-left corner within the sheet.
    pub fn x(&self) -> usize {
        self.x
    }

    /// Y location of the placement's bottom-left corner within the sheet.
    pub fn y(&self) -> usize {
        self.y
    }

    /// Whether the part was rotated 90 degrees to make it fit.
    pub fn rotated(&self) -> bool {
        self.rotated
    }

    /// Effective width: the part's intrinsic width, or its intrinsic height
    /// when the placement is rotated.
    pub fn width(&self) -> usize {
        if self.rotated {
            self.part.height()
        } else {
            self.part.width()
        }
    }

    /// Effective height of the placement.
    pub fn height(&self) -> usize {
        if self.rotated {
            self.part.width()
        } else {
            self.part.height()
        }
    }

    pub(crate) fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Builds a fresh part with this placement's effective dimensions, so the
    /// receiver of a migration never aliases the donor.
    pub(crate) fn detach(&self) -> Part {
        Part::new(self.width(), self.height(), self.part.name().to_string())
    }
}

/// The layout of a single stock sheet: its configuration, the parts placed on
/// it in placement order, and the free rectangles still available.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug)]
pub struct SheetLayout {
    sheet_width: usize,
    sheet_height: usize,
    kerf: usize,
    strategy: Strategy,
    allow_rotation: bool,
    placed: Vec<PlacedPart>,
    #[cfg_attr(feature = "serialize", serde(skip))]
    free_rects: Vec<FreeRect>,
}

impl SheetLayout {
    pub(crate) fn new(
        sheet_width: usize,
        sheet_height: usize,
        kerf: usize,
        strategy: Strategy,
        allow_rotation: bool,
    ) -> Self {
        // A new sheet starts with a single free rectangle spanning all of it.
        let free_rect = FreeRect {
            x: 0,
            y: 0,
            width: sheet_width,
            height: sheet_height,
        };

        SheetLayout {
            sheet_width,
            sheet_height,
            kerf,
            strategy,
            allow_rotation,
            placed: Vec::new(),
            free_rects: vec![free_rect],
        }
    }

    /// Width of the stock sheet.
    pub fn sheet_width(&self) -> usize {
        self.sheet_width
    }

    /// Height of the stock sheet.
    pub fn sheet_height(&self) -> usize {
        self.sheet_height
    }

    /// Width of the cut between placements.
    pub fn kerf(&self) -> usize {
        self.kerf
    }

    /// Scoring strategy this sheet places with.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Whether placements on this sheet may rotate parts 90 degrees.
    pub fn allow_rotation(&self) -> bool {
        self.allow_rotation
    }

    /// The placed parts, in placement order.
    pub fn placed(&self) -> &[PlacedPart] {
        &self.placed
    }

    /// Total effective area of the placed parts.
    pub fn used_area(&self) -> u64 {
        self.placed.iter().map(PlacedPart::area).sum()
    }

    /// Sheet area not covered by any placed part.
    pub fn scrap_area(&self) -> u64 {
        self.sheet_width as u64 * self.sheet_height as u64 - self.used_area()
    }

    fn orientations(&self, part: &Part) -> SmallVec<[(usize, usize, bool); 2]> {
        let mut candidates = SmallVec::new();
        candidates.push((part.width(), part.height(), false));
        if self.allow_rotation {
            candidates.push((part.height(), part.width(), true));
        }
        candidates
    }

    /// Attempts to place `part` on this sheet. On success the part is recorded
    /// and the free rectangles are updated; on failure the sheet is unchanged.
    pub(crate) fn try_place(&mut self, part: &Part) -> bool {
        let orientations = self.orientations(part);

        // Exact-fit pass: a candidate whose width or height matches the free
        // rectangle exactly wins over anything the scored pass would pick.
        let mut exact_best: Option<(usize, usize, usize, bool, usize, usize, usize, usize)> = None;
        for (index, free_rect) in self.free_rects.iter().enumerate() {
            for &(pw, ph, rotated) in &orientations {
                if pw <= free_rect.width
                    && ph <= free_rect.height
                    && (pw == free_rect.width || ph == free_rect.height)
                {
                    let candidate = (
                        free_rect.y,
                        free_rect.x,
                        index,
                        rotated,
                        free_rect.x,
                        free_rect.y,
                        pw,
                        ph,
                    );
                    if exact_best.map_or(true, |best| candidate < best) {
                        exact_best = Some(candidate);
                    }
                }
            }
        }
        if let Some((_, _, index, rotated, x, y, pw, ph)) = exact_best {
            self.place_and_split(index, part, rotated, x, y, pw, ph);
            return true;
        }

        // Scored pass.
        let mut best: Option<(
            u64,
            u64,
            usize,
            usize,
            usize,
            usize,
            bool,
            usize,
            usize,
            usize,
            usize,
        )> = None;
        for (index, free_rect) in self.free_rects.iter().enumerate() {
            for &(pw, ph, rotated) in &orientations {
                if pw <= free_rect.width && ph <= free_rect.height {
                    let (first, second) = self
                        .strategy
                        .primary_key(free_rect.width - pw, free_rect.height - ph);
                    let candidate = (
                        first,
                        second,
                        free_rect.y,
                        free_rect.x,
                        self.strip_bias(free_rect, pw),
                        index,
                        rotated,
                        free_rect.x,
                        free_rect.y,
                        pw,
                        ph,
                    );
                    if best.map_or(true, |current| candidate < current) {
                        best = Some(candidate);
                    }
                }
            }
        }
        match best {
            Some((_, _, _, _, _, index, rotated, x, y, pw, ph)) => {
                self.place_and_split(index, part, rotated, x, y, pw, ph);
                true
            }
            None => false,
        }
    }

    /// Penalty favoring placements that continue a vertical column of
    /// equally-wide parts against the left edge. Smaller is better.
    fn strip_bias(&self, free_rect: &FreeRect, piece_width: usize) -> usize {
        let mut penalty = 10_000;
        if free_rect.x == 0 {
            penalty -= 200;
        }
        let continues_column = self.placed.iter().any(|placed| {
            placed.x() == free_rect.x
                && placed.width() == piece_width
                && placed.y() + placed.height() <= free_rect.y + 1
        });
        if continues_column {
            penalty -= 5_000;
        }
        penalty - cmp::min(free_rect.y, 200)
    }

    fn place_and_split(
        &mut self,
        index: usize,
        part: &Part,
        rotated: bool,
        x: usize,
        y: usize,
        pw: usize,
        ph: usize,
    ) {
        self.placed.push(PlacedPart {
            part: part.clone(),
            x,
            y,
            rotated,
        });

        // Candidate keys tie on free-rect index, so both the ordered removal
        // here and the right-before-top emission below are observable.
        let free_rect = self.free_rects.remove(index);

        // Kerf is only inserted where the cut is interior to the sheet.
        let kerf_x = if x + pw < free_rect.x + free_rect.width {
            self.kerf
        } else {
            0
        };
        let kerf_y = if y + ph < free_rect.y + free_rect.height {
            self.kerf
        } else {
            0
        };

        let right_x = x + pw + kerf_x;
        if right_x < free_rect.x + free_rect.width {
            self.free_rects.push(FreeRect {
                x: right_x,
                y: free_rect.y,
                width: free_rect.x + free_rect.width - right_x,
                height: free_rect.height,
            });
        }

        let top_y = y + ph + kerf_y;
        if top_y < free_rect.y + free_rect.height {
            self.free_rects.push(FreeRect {
                x: free_rect.x,
                y: top_y,
                width: free_rect.width,
                height: free_rect.y + free_rect.height - top_y,
            });
        }

        self.prune_against(FreeRect {
            x,
            y,
            width: pw,
            height: ph,
        });
        self.merge_free_rects();
    }

    /// Replaces every free rectangle intersecting `used` by up to four
    /// fragments covering the portion outside it.
    fn prune_against(&mut self, used: FreeRect) {
        let mut kept: Vec<FreeRect> = Vec::with_capacity(self.free_rects.len());
        for free_rect in &self.free_rects {
            if !free_rect.intersects(&used) {
                kept.push(*free_rect);
                continue;
            }

            let mut fragments: SmallVec<[FreeRect; 4]> = SmallVec::new();
            if used.y > free_rect.y {
                fragments.push(FreeRect {
                    x: free_rect.x,
                    y: free_rect.y,
                    width: free_rect.width,
                    height: used.y - free_rect.y,
                });
            }
            if used.y + used.height < free_rect.y + free_rect.height {
                fragments.push(FreeRect {
                    x: free_rect.x,
                    y: used.y + used.height,
                    width: free_rect.width,
                    height: (free_rect.y + free_rect.height) - (used.y + used.height),
                });
            }
            let band_low = cmp::max(free_rect.y, used.y);
            let band_high = cmp::min(free_rect.y + free_rect.height, used.y + used.height);
            if used.x > free_rect.x {
                fragments.push(FreeRect {
                    x: free_rect.x,
                    y: band_low,
                    width: used.x - free_rect.x,
                    height: band_high - band_low,
                });
            }
            if used.x + used.width < free_rect.x + free_rect.width {
                let right_x = used.x + used.width;
                fragments.push(FreeRect {
                    x: right_x,
                    y: band_low,
                    width: (free_rect.x + free_rect.width) - right_x,
                    height: band_high - band_low,
                });
            }

            kept.extend(
                fragments
                    .into_iter()
                    .filter(|fragment| fragment.width > 0 && fragment.height > 0),
            );
        }
        self.free_rects = kept;
    }

    /// Drops free rects contained in another, then repeatedly merges pairs
    /// sharing a full edge until a pass makes no merge.
    fn merge_free_rects(&mut self) {
        let rects = &self.free_rects;
        let cleaned: Vec<FreeRect> = rects
            .iter()
            .enumerate()
            .filter(|(i, rect)| {
                !rects
                    .iter()
                    .enumerate()
                    .any(|(j, other)| *i != j && other.contains(rect))
            })
            .map(|(_, rect)| *rect)
            .collect();
        self.free_rects = cleaned;

        let mut merged = true;
        while merged {
            merged = false;
            let mut combined: Vec<FreeRect> = Vec::with_capacity(self.free_rects.len());
            let mut consumed = vec![false; self.free_rects.len()];
            for i in 0..self.free_rects.len() {
                if consumed[i] {
                    continue;
                }
                let a = self.free_rects[i];
                let mut paired = false;
                for j in i + 1..self.free_rects.len() {
                    if consumed[j] {
                        continue;
                    }
                    let b = self.free_rects[j];
                    if a.y == b.y && a.height == b.height && (a.x + a.width == b.x || b.x + b.width == a.x)
                    {
                        combined.push(FreeRect {
                            x: cmp::min(a.x, b.x),
                            y: a.y,
                            width: a.width + b.width,
                            height: a.height,
                        });
                        consumed[i] = true;
                        consumed[j] = true;
                        merged = true;
                        paired = true;
                        break;
                    }
                    if a.x == b.x && a.width == b.width && (a.y + a.height == b.y || b.y + b.height == a.y)
                    {
                        combined.push(FreeRect {
                            x: a.x,
                            y: cmp::min(a.y, b.y),
                            width: a.width,
                            height: a.height + b.height,
                        });
                        consumed[i] = true;
                        consumed[j] = true;
                        merged = true;
                        paired = true;
                        break;
                    }
                }
                if !paired {
                    combined.push(a);
                    consumed[i] = true;
                }
            }
            self.free_rects = combined;
        }
    }

    pub(crate) fn remove_placed(&mut self, index: usize) -> PlacedPart {
        self.placed.remove(index)
    }

    /// Resets the sheet and re-places its parts from scratch in descending
    /// effective-area order under the sheet's own configuration.
    pub(crate) fn rebuild(&mut self) {
        let mut parts: Vec<Part> = self.placed.iter().map(PlacedPart::detach).collect();
        parts.sort_by_key(|part| cmp::Reverse(part.area()));

        self.placed.clear();
        self.free_rects = vec![FreeRect {
            x: 0,
            y: 0,
            width: self.sheet_width,
            height: self.sheet_height,
        }];

        for part in &parts {
            self.try_place(part);
        }
    }

    /// Attempts a placement under a temporarily substituted strategy and
    /// rotation flag, restoring the sheet's own configuration afterwards.
    pub(crate) fn try_place_as(
        &mut self,
        part: &Part,
        strategy: Strategy,
        allow_rotation: bool,
    ) -> bool {
        let saved = (self.strategy, self.allow_rotation);
        self.strategy = strategy;
        self.allow_rotation = allow_rotation;
        let placed = self.try_place(part);
        self.strategy = saved.0;
        self.allow_rotation = saved.1;
        placed
    }
}
