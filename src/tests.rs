use super::*;

use crate::search::{
    compact_sheets, pack_parts, refine_sheets, score_sheets, shuffle_near_equal_areas,
};

use rand::prelude::*;

use std::cell::RefCell;
use std::cmp;

fn total_scrap(sheets: &[SheetLayout]) -> u64 {
    sheets.iter().map(SheetLayout::scrap_area).sum()
}

/// Separation between two intervals; negative when they overlap.
fn interval_gap(a_start: usize, a_len: usize, b_start: usize, b_len: usize) -> i64 {
    cmp::max(
        a_start as i64 - (b_start + b_len) as i64,
        b_start as i64 - (a_start + a_len) as i64,
    )
}

/// Asserts every placement lies within its sheet and every pair of placements
/// on a sheet is separated by at least `min_gap` on some axis.
fn assert_sound_layout(sheets: &[SheetLayout], min_gap: usize) {
    for sheet in sheets {
        for placed in sheet.placed() {
            assert!(
                placed.x() + placed.width() <= sheet.sheet_width()
                    && placed.y() + placed.height() <= sheet.sheet_height(),
                "{} sticks out of the sheet",
                placed.part()
            );
        }

        let placed = sheet.placed();
        for i in 0..placed.len() {
            for j in i + 1..placed.len() {
                let a = &placed[i];
                let b = &placed[j];
                let gap_x = interval_gap(a.x(), a.width(), b.x(), b.width());
                let gap_y = interval_gap(a.y(), a.height(), b.y(), b.height());
                assert!(
                    gap_x >= min_gap as i64 || gap_y >= min_gap as i64,
                    "{} and {} are closer than {}",
                    a.part(),
                    b.part(),
                    min_gap
                );
            }
        }
    }
}

fn dimension_multiset<I>(dims: I, rotation_equivalent: bool) -> Vec<(usize, usize)>
where
    I: IntoIterator<Item = (usize, usize)>,
{
    let mut out: Vec<(usize, usize)> = dims
        .into_iter()
        .map(|(width, height)| {
            if rotation_equivalent {
                (cmp::min(width, height), cmp::max(width, height))
            } else {
                (width, height)
            }
        })
        .collect();
    out.sort_unstable();
    out
}

fn assert_conservation(
    sheets: &[SheetLayout],
    piece_list: &[(usize, usize, usize)],
    rotation_equivalent: bool,
) {
    let placed = dimension_multiset(
        sheets
            .iter()
            .flat_map(|sheet| sheet.placed().iter())
            .map(|placed| (placed.width(), placed.height())),
        rotation_equivalent,
    );
    let requested = dimension_multiset(
        piece_list
            .iter()
            .flat_map(|&(width, height, quantity)| std::iter::repeat((width, height)).take(quantity)),
        rotation_equivalent,
    );
    assert_eq!(placed, requested);
}

fn snapshot(sheets: &[SheetLayout]) -> Vec<Vec<(String, usize, usize, bool)>> {
    sheets
        .iter()
        .map(|sheet| {
            sheet
                .placed()
                .iter()
                .map(|placed| {
                    (
                        placed.part().name().to_string(),
                        placed.x(),
                        placed.y(),
                        placed.rotated(),
                    )
                })
                .collect()
        })
        .collect()
}

#[test]
fn full_sheet_part_has_zero_scrap() {
    let sheets = optimize(100, 100, 0, &[(100, 100, 1)], "BSSF", true, 1);

    assert_eq!(sheets.len(), 1);
    assert_eq!(sheets[0].placed().len(), 1);
    assert_eq!(
        (sheets[0].placed()[0].x(), sheets[0].placed()[0].y()),
        (0, 0)
    );
    assert_eq!(sheets[0].used_area(), 10_000);
    assert_eq!(total_scrap(&sheets), 0);
}

#[test]
fn rotated_part_fills_a_sideways_sheet() {
    let sheets = optimize(50, 100, 0, &[(100, 50, 1)], "BSSF", true, 1);

    assert_eq!(sheets.len(), 1);
    assert!(sheets[0].placed()[0].rotated());
    assert_eq!(total_scrap(&sheets), 0);
}

#[test]
fn oversized_part_yields_no_layouts() {
    let sheets = optimize(50, 50, 0, &[(60, 10, 1)], "BSSF", true, 1);

    assert!(sheets.is_empty());
}

#[test]
fn zero_attempts_yield_no_layouts() {
    let sheets = optimize(100, 100, 0, &[(10, 10, 1)], "BSSF", true, 0);

    assert!(sheets.is_empty());
}

#[test]
fn four_oversquare_parts_need_four_sheets() {
    let piece_list = [(60, 60, 4)];

    let sheets = optimize(100, 100, 0, &piece_list, "BSSF", true, 10);

    assert_eq!(sheets.len(), 4);
    assert_eq!(total_scrap(&sheets), 4 * (10_000 - 3_600));
    assert_sound_layout(&sheets, 0);
    assert_conservation(&sheets, &piece_list, true);
}

#[test]
fn quarter_parts_tile_one_sheet() {
    let piece_list = [(50, 50, 4)];

    let sheets = optimize(100, 100, 0, &piece_list, "BSSF", false, 5);

    assert_eq!(sheets.len(), 1);
    assert_eq!(total_scrap(&sheets), 0);
    assert!(sheets[0].placed().iter().all(|placed| !placed.rotated()));

    let mut positions: Vec<(usize, usize)> = sheets[0]
        .placed()
        .iter()
        .map(|placed| (placed.x(), placed.y()))
        .collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![(0, 0), (0, 50), (50, 0), (50, 50)]);
    assert_conservation(&sheets, &piece_list, false);
}

#[test]
fn kerf_pushes_parts_apart() {
    let piece_list = [(49, 49, 4)];

    let sheets = optimize(100, 100, 2, &piece_list, "BSSF", false, 5);

    assert_eq!(sheets.len(), 1);
    assert_eq!(total_scrap(&sheets), 10_000 - 4 * 2_401);

    let mut positions: Vec<(usize, usize)> = sheets[0]
        .placed()
        .iter()
        .map(|placed| (placed.x(), placed.y()))
        .collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![(0, 0), (0, 51), (51, 0), (51, 51)]);
    assert_sound_layout(&sheets, 2);
}

#[test]
fn narrow_strips_fit_one_sheet() {
    let piece_list = [(40, 10, 10)];

    let sheets = optimize(100, 100, 0, &piece_list, "BSSF", true, 20);

    assert_eq!(sheets.len(), 1);
    assert_sound_layout(&sheets, 0);
    assert_conservation(&sheets, &piece_list, true);
}

#[test]
fn every_strategy_places_all_parts() {
    let piece_list = [(37, 23, 4), (19, 53, 3), (29, 29, 5)];

    for tag in ["BSSF", "BAF", "BLSF", "not-a-strategy"] {
        let sheets = optimize(120, 90, 3, &piece_list, tag, true, 4);

        assert!(!sheets.is_empty(), "no layout for {}", tag);
        assert_sound_layout(&sheets, 0);
        assert_conservation(&sheets, &piece_list, true);
    }
}

#[test]
fn unknown_strategy_tag_falls_back_to_short_side_fit() {
    assert_eq!(Strategy::from_tag("BAF"), Strategy::BestAreaFit);
    assert_eq!(Strategy::from_tag("BLSF"), Strategy::BestLongSideFit);
    assert_eq!(Strategy::from_tag("BSSF"), Strategy::BestShortSideFit);
    assert_eq!(Strategy::from_tag("worst-fit"), Strategy::BestShortSideFit);
}

#[test]
fn results_are_deterministic_for_a_seed() {
    let run = || {
        let mut optimizer = Optimizer::new(120, 90);
        optimizer
            .add_cut_pieces([
                CutPiece {
                    width: 37,
                    height: 23,
                    quantity: 7,
                },
                CutPiece {
                    width: 19,
                    height: 53,
                    quantity: 5,
                },
                CutPiece {
                    width: 61,
                    height: 11,
                    quantity: 4,
                },
                CutPiece {
                    width: 29,
                    height: 29,
                    quantity: 6,
                },
            ])
            .set_kerf(3)
            .set_attempts(6)
            .set_random_seed(42);
        optimizer.optimize()
    };

    assert_eq!(snapshot(&run()), snapshot(&run()));
}

#[test]
fn mixed_parts_keep_every_requested_dimension() {
    let piece_list = [(37, 23, 7), (19, 53, 5), (61, 11, 4), (29, 29, 6)];

    let mut optimizer = Optimizer::new(120, 90);
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
        .set_kerf(3)
        .set_attempts(6)
        .set_random_seed(11);
    let sheets = optimizer.optimize();

    assert!(!sheets.is_empty());
    assert_sound_layout(&sheets, 0);
    assert_conservation(&sheets, &piece_list, true);
}

#[test]
fn rotation_disabled_is_respected_everywhere() {
    let piece_list = [(30, 20, 6), (20, 10, 8)];

    let sheets = optimize(70, 70, 2, &piece_list, "BAF", false, 8);

    assert!(!sheets.is_empty());
    assert!(sheets
        .iter()
        .flat_map(|sheet| sheet.placed().iter())
        .all(|placed| !placed.rotated()));
    assert_conservation(&sheets, &piece_list, false);
}

#[test]
fn compaction_and_refinement_never_worsen_the_packing() {
    let mut optimizer = Optimizer::new(120, 90);
    optimizer.add_cut_pieces([
        CutPiece {
            width: 37,
            height: 23,
            quantity: 7,
        },
        CutPiece {
            width: 19,
            height: 53,
            quantity: 5,
        },
        CutPiece {
            width: 61,
            height: 11,
            quantity: 4,
        },
        CutPiece {
            width: 29,
            height: 29,
            quantity: 6,
        },
    ]);
    let base = optimizer.flatten_cut_pieces();

    let mut rng: StdRng = SeedableRng::seed_from_u64(7);
    let mut parts = base;
    parts.sort_by_key(|part| cmp::Reverse(part.area()));
    shuffle_near_equal_areas(&mut parts, &mut rng);

    let packed = pack_parts(&parts, 120, 90, 3, Strategy::BestShortSideFit, true).unwrap();
    let packed_score = score_sheets(&packed);

    let mut sheets = packed;
    compact_sheets(&mut sheets, Strategy::BestShortSideFit, true);
    let compacted_score = score_sheets(&sheets);
    assert!(compacted_score <= packed_score);

    refine_sheets(
        &mut sheets,
        120,
        90,
        3,
        Strategy::BestShortSideFit,
        true,
        REFINE_ROUNDS,
        &mut rng,
    );
    assert!(score_sheets(&sheets) <= compacted_score);
}

#[test]
fn progress_reaches_one_over_all_attempts() {
    let reported = RefCell::new(Vec::new());

    let mut optimizer = Optimizer::new(100, 100);
    optimizer
        .add_cut_piece(CutPiece {
            width: 40,
            height: 30,
            quantity: 5,
        })
        .set_attempts(4);
    let sheets = optimizer.optimize_with_progress(|progress| {
        reported.borrow_mut().push(progress);
    });

    assert!(!sheets.is_empty());
    let reported = reported.into_inner();
    assert_eq!(reported.len(), 4);
    assert!(reported.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(reported.last(), Some(&1.0));
}

#[test]
fn builder_and_free_function_agree() {
    let piece_list = [(30, 20, 4), (25, 25, 3)];

    let from_function = optimize(80, 60, 2, &piece_list, "BAF", true, 5);

    let mut optimizer = Optimizer::new(80, 60);
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
        .set_kerf(2)
        .set_strategy(Strategy::BestAreaFit)
        .set_attempts(5);
    let from_builder = optimizer.optimize();

    assert_eq!(snapshot(&from_function), snapshot(&from_builder));
}

#[test]
fn part_display_includes_name_and_size() {
    let part = Part::new(40, 10, "P3".to_string());

    assert_eq!(part.to_string(), "P3(40x10)");
}

#[test]
fn oversized_error_display_names_the_part_and_sheet() {
    let err = Error::OversizedPart {
        name: "P1".to_string(),
        width: 60,
        height: 10,
        sheet_width: 50,
        sheet_height: 50,
    };

    assert_eq!(
        err.to_string(),
        "part P1 (60x10) does not fit the 50x50 sheet"
    );
}
