//! Search layers above the single-sheet engine: the first-fit packer, the
//! global compactor, the heavy refiner, and the randomized near-equal-area
//! shuffle that drives the multi-start attempts.

use crate::sheet::{PlacedPart, SheetLayout};
use crate::{Error, Part, Result, Strategy};

use rand::prelude::*;

use std::cmp;

/// Lexicographic quality of a sheet list: fewer sheets first, then less scrap.
pub(crate) fn score_sheets(sheets: &[SheetLayout]) -> (usize, u64) {
    let scrap = sheets.iter().map(SheetLayout::scrap_area).sum();
    (sheets.len(), scrap)
}

/// First-fit packs `parts` in the given order, opening a new sheet whenever no
/// existing sheet accepts a part. Errors only when a freshly opened sheet
/// refuses a part.
pub(crate) fn pack_parts(
    parts: &[Part],
    sheet_width: usize,
    sheet_height: usize,
    kerf: usize,
    strategy: Strategy,
    allow_rotation: bool,
) -> Result<Vec<SheetLayout>> {
    let mut sheets: Vec<SheetLayout> = Vec::new();
    for part in parts {
        if sheets.iter_mut().any(|sheet| sheet.try_place(part)) {
            continue;
        }

        let mut sheet = SheetLayout::new(sheet_width, sheet_height, kerf, strategy, allow_rotation);
        if !sheet.try_place(part) {
            return Err(Error::OversizedPart {
                name: part.name().to_string(),
                width: part.width(),
                height: part.height(),
                sheet_width,
                sheet_height,
            });
        }
        sheets.push(sheet);
    }
    Ok(sheets)
}

/// Migrates parts from later sheets into earlier ones until a full scan yields
/// no strictly-improving move.
///
/// Donor parts are offered smallest-first and receivers place them under the
/// driver's strategy and rotation flag. An accepted migration is never rolled
/// back, even when the resulting score is not an improvement.
pub(crate) fn compact_sheets(
    sheets: &mut Vec<SheetLayout>,
    strategy: Strategy,
    allow_rotation: bool,
) {
    let mut improved = true;
    while improved {
        improved = false;
        let best_score = score_sheets(sheets);

        for donor_index in (1..sheets.len()).rev() {
            let mut order: Vec<usize> = (0..sheets[donor_index].placed().len()).collect();
            order.sort_by_key(|&part_index| sheets[donor_index].placed()[part_index].area());

            let mut migrated: Option<usize> = None;
            for &part_index in &order {
                let candidate = sheets[donor_index].placed()[part_index].detach();
                let accepted = (0..donor_index).any(|receiver_index| {
                    sheets[receiver_index].try_place_as(&candidate, strategy, allow_rotation)
                });
                if accepted {
                    migrated = Some(part_index);
                    break;
                }
            }

            if let Some(part_index) = migrated {
                sheets[donor_index].remove_placed(part_index);
                if sheets[donor_index].placed().is_empty() {
                    sheets.remove(donor_index);
                } else {
                    sheets[donor_index].rebuild();
                }

                if score_sheets(sheets) < best_score {
                    improved = true;
                }
            }
            if improved {
                break;
            }
        }
    }
}

/// Dissolves the two highest-scrap sheets each round, pools their parts with
/// re-packings of the remaining sheets, and keeps the re-packed result when it
/// strictly improves the score. Runs at most `rounds` rounds and stops early
/// once a round changes nothing.
pub(crate) fn refine_sheets<R>(
    sheets: &mut Vec<SheetLayout>,
    sheet_width: usize,
    sheet_height: usize,
    kerf: usize,
    strategy: Strategy,
    allow_rotation: bool,
    rounds: usize,
    rng: &mut R,
) where
    R: Rng + ?Sized,
{
    for _ in 0..rounds {
        if sheets.len() <= 1 {
            break;
        }

        let mut order: Vec<usize> = (0..sheets.len()).collect();
        order.sort_by_key(|&index| cmp::Reverse(sheets[index].scrap_area()));
        let victims = [order[0], order[1]];

        let mut pool: Vec<Part> = Vec::new();
        for (index, sheet) in sheets.iter().enumerate() {
            if victims.contains(&index) {
                continue;
            }
            let mut clone =
                SheetLayout::new(sheet_width, sheet_height, kerf, strategy, allow_rotation);
            let mut parts: Vec<Part> = sheet.placed().iter().map(PlacedPart::detach).collect();
            parts.sort_by_key(|part| cmp::Reverse(part.area()));
            for part in &parts {
                clone.try_place(part);
            }
            pool.extend(clone.placed().iter().map(PlacedPart::detach));
        }
        for &victim in &victims {
            pool.extend(sheets[victim].placed().iter().map(PlacedPart::detach));
        }

        pool.sort_by_key(|part| cmp::Reverse(part.area()));
        shuffle_near_equal_areas(&mut pool, rng);

        let new_sheets = match pack_parts(
            &pool,
            sheet_width,
            sheet_height,
            kerf,
            strategy,
            allow_rotation,
        ) {
            Ok(new_sheets) => new_sheets,
            Err(_) => continue,
        };

        if score_sheets(&new_sheets) < score_sheets(sheets) {
            *sheets = new_sheets;
        } else {
            break;
        }
    }
}

/// Shuffles each maximal run of near-equal areas in place. A run extends while
/// an area stays within `max(1, head_area / 50)` of the run head, so the
/// overall big-to-small ordering survives while tie-breaks vary.
pub(crate) fn shuffle_near_equal_areas<R>(parts: &mut [Part], rng: &mut R)
where
    R: Rng + ?Sized,
{
    let mut start = 0;
    while start < parts.len() {
        let head_area = parts[start].area();
        let band = cmp::max(1, head_area / 50);
        let mut end = start + 1;
        while end < parts.len() && parts[end].area().abs_diff(head_area) <= band {
            end += 1;
        }
        parts[start..end].shuffle(rng);
        start = end;
    }
}
