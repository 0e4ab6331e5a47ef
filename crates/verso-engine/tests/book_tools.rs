//! Book maintenance tools: correction, clearing, export, compression,
//! position-list merging and the book-to-hash transfer.

use verso_core::{Color, Square, generate_all};
use verso_engine::Engine;
use verso_engine::book::{
    CLEAR_EXACT, CLEAR_MIDGAME, CLEAR_WLD, CONFIRMED_WIN, FULL_SOLVED, WLD_SOLVED,
};
use verso_engine::search::tt::{ENDGAME_MODE, ENDGAME_SCORE, EXACT_VALUE};

fn engine() -> Engine {
    Engine::new(1, 14)
}

fn temp(name: &str) -> String {
    let mut path = std::env::temp_dir();
    path.push(format!("verso-tools-{}-{name}", std::process::id()));
    path.to_string_lossy().into_owned()
}

/// Play one deterministic game: at each turn pick the legal move at a
/// fixed index derived from `policy`. Returns signed moves, positive for
/// Black and negative for White.
fn play_policy(engine: &mut Engine, policy: usize) -> Vec<i16> {
    engine.core.pos.reset();
    let mut side = Color::Black;
    let mut passes = 0;
    let mut moves = Vec::new();
    while passes < 2 {
        let legal = generate_all(&engine.core.pos, side);
        if legal.is_empty() {
            passes += 1;
            side = side.opponent();
            continue;
        }
        passes = 0;
        let sq = legal[policy % legal.len()];
        engine.core.pos.refresh_piece_counts();
        assert!(engine.core.pos.make_move(side, sq, true) > 0);
        let raw = sq.pos() as i16;
        moves.push(if side == Color::Black { raw } else { -raw });
        side = side.opponent();
    }
    engine.core.pos.reset();
    moves
}

/// A deterministic near-complete game: the first fixed policy whose game
/// runs deep enough (early wipeouts are rejected).
fn scripted_game(engine: &mut Engine) -> Vec<i16> {
    for policy in 0..8 {
        let game = play_policy(engine, policy);
        if game.len() >= 55 {
            return game;
        }
    }
    panic!("every fixed policy ended in an early wipeout");
}

/// Learn one game without the path-update pass (cheap) and minimax.
fn learned_engine() -> (Engine, Vec<i16>) {
    let mut engine = engine();
    let game = scripted_game(&mut engine);
    engine
        .book
        .add_new_game(&mut engine.core, &game, 0, 0, 0, false, false)
        .unwrap();
    engine.book.minimax_tree(&mut engine.core);
    (engine, game)
}

/// Replay a prefix of a signed game on the engine's board.
fn replay(engine: &mut Engine, game: &[i16], count: usize) {
    engine.core.pos.reset();
    for &signed in &game[..count] {
        let side = if signed > 0 { Color::Black } else { Color::White };
        let sq = Square::from_pos(signed.unsigned_abs() as usize).unwrap();
        engine.core.pos.refresh_piece_counts();
        assert!(engine.core.pos.make_move(side, sq, true) > 0);
    }
}

#[test]
fn correct_tree_solves_the_tail() {
    let (mut engine, game) = learned_engine();
    let tail_empties = 60 - (game.len() - 1);
    engine.book.correct_tree(&mut engine.core, tail_empties + 1, true);

    // The path node one move from the end must now be exactly solved.
    replay(&mut engine, &game, game.len() - 1);
    let index = engine
        .book
        .find_position(&engine.core.pos)
        .expect("path position is in book");
    assert!(engine.book.node_at(index).is_full_solved());
    engine.core.pos.reset();
}

#[test]
fn correction_script_roundtrips_through_merge() {
    let (mut engine, game) = learned_engine();
    let script = temp("correct.pos");
    let results = temp("correct.res");
    std::fs::remove_file(&script).ok();

    let tail_empties = 60 - game.len();
    engine.book.set_output_script_name(Some(script.clone()));
    engine.book.correct_tree(&mut engine.core, tail_empties + 4, true);
    engine.book.set_output_script_name(None);

    let script_text = std::fs::read_to_string(&script).expect("script was written");
    let script_lines: Vec<&str> = script_text.lines().collect();
    assert!(script_lines.len() >= 8, "several positions exported");
    assert_eq!(script_lines.len() % 4, 0);

    // Fake a solver pass: declare every exported position a draw.
    let result_text: String = script_lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            if (index + 1) % 4 == 3 { "Draw\n".to_string() } else { format!("{line}\n") }
        })
        .collect();
    std::fs::write(&results, result_text).unwrap();

    let merged = engine
        .book
        .merge_position_list(&mut engine.core, &script, &results)
        .unwrap();
    assert_eq!(merged, script_lines.len() / 4);

    // The first exported position is now WLD-solved as a draw.
    engine.core.pos.set_from_dump(script_lines[2]).unwrap();
    let index = engine.book.find_position(&engine.core.pos).unwrap();
    let node = engine.book.node_at(index);
    assert!(node.is_wld_solved());
    assert_eq!(node.black_minimax_score, 0);

    std::fs::remove_file(&script).ok();
    std::fs::remove_file(&results).ok();
}

#[test]
fn clear_tree_removes_labels() {
    let (mut engine, game) = learned_engine();
    let tail_empties = 60 - (game.len() - 1);
    engine.book.correct_tree(&mut engine.core, tail_empties + 1, true);

    replay(&mut engine, &game, game.len() - 1);
    let index = engine.book.find_position(&engine.core.pos).unwrap();
    assert!(engine.book.node_at(index).is_full_solved());
    engine.core.pos.reset();

    engine
        .book
        .clear_tree(&mut engine.core, 0, 60, CLEAR_MIDGAME | CLEAR_WLD | CLEAR_EXACT);
    assert!(!engine.book.node_at(index).is_full_solved());
    assert!(!engine.book.node_at(index).is_wld_solved());
    assert_eq!(engine.book.node_at(index).depth(), 0);
}

#[test]
fn validate_tree_fills_missing_deviations() {
    let mut engine = engine();
    // A one-node book: the initial position with no deviation on record.
    engine.book.insert_position(&engine.core.pos, Color::Black);
    let evaluated = engine.book.validate_tree(&mut engine.core);
    assert_eq!(evaluated, 1);
    let index = engine.book.find_position(&engine.core.pos).unwrap();
    let node = engine.book.node_at(index);
    assert!(node.best_alternative_move > 0);
    assert_ne!(node.alternative_score, verso_engine::book::NO_SCORE);
}

#[test]
fn evaluate_tree_respects_batch_size() {
    let (mut engine, _) = learned_engine();
    engine.book.set_search_depth(3);
    engine.book.set_max_batch_size(2);
    engine.book.evaluate_tree(&mut engine.core);

    // The root is visited first in the depth-first sweep, so it carries
    // the new deviation depth.
    engine.core.pos.reset();
    let root = engine.book.find_position(&engine.core.pos).unwrap();
    assert_eq!(engine.book.node_at(root).depth(), 3);
}

#[test]
fn examine_tree_counts_leaves() {
    let (mut engine, _) = learned_engine();
    let stats = engine.book.examine_tree(&mut engine.core);
    assert!(stats.leaf_count >= 1);
    assert_eq!(stats.unreachable_count, 0);
    let total: usize = (0..=60)
        .map(|stage| {
            stats.exact_count[stage]
                + stats.wld_count[stage]
                + stats.exhausted_count[stage]
                + stats.common_count[stage]
        })
        .sum();
    assert_eq!(total, engine.book.node_count());
}

#[test]
fn export_covers_the_learned_line() {
    let (mut engine, game) = learned_engine();
    let mut buffer: Vec<u8> = Vec::new();
    engine.book.export_tree(&mut engine.core, &mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert!(!text.is_empty());
    // Every exported line is a sequence of two-character moves reaching
    // the end of the learned game.
    for line in text.lines() {
        assert_eq!(line.len() % 2, 0);
        assert_eq!(line.len(), 2 * game.len());
    }
}

#[test]
fn compressed_database_roundtrips() {
    let (mut engine, _) = learned_engine();
    let packed = temp("book.cpr");
    let unpacked = temp("book.unp");

    engine.book.write_compressed_database(&mut engine.core, &packed).unwrap();
    engine
        .book
        .unpack_compressed_database(&mut engine.core, &packed, &unpacked)
        .unwrap();

    let mut restored = Engine::new(3, 12);
    restored.book.read_binary_database(&unpacked).unwrap();
    assert_eq!(restored.book.node_count(), engine.book.node_count());

    // Same multiset of (key, scores) regardless of arena order.
    let snapshot = |engine: &Engine| {
        let mut all: Vec<(i32, i32, i16, i16)> = (0..engine.book.node_count())
            .map(|i| {
                let node = engine.book.node_at(i);
                (
                    node.hash_val1,
                    node.hash_val2,
                    node.black_minimax_score,
                    node.white_minimax_score,
                )
            })
            .collect();
        all.sort_unstable();
        all
    };
    assert_eq!(snapshot(&restored), snapshot(&engine));

    std::fs::remove_file(&packed).ok();
    std::fs::remove_file(&unpacked).ok();
}

#[test]
fn forced_opening_is_followed_under_symmetry() {
    let mut engine = engine();
    engine.game_init(None).unwrap();

    // At the start any rotation matches; the suggested move is one of
    // the four symmetric openings.
    let mv = engine
        .book
        .check_forced_opening(&mut engine.core, Color::Black, "d3c5f6")
        .expect("opening applies from the start");
    let openings = ["d3", "c4", "f5", "e6"];
    assert!(openings.contains(&format!("{mv}").as_str()));

    // After d3 only the identity matches, so the continuation is c5.
    let d3: Square = "d3".parse().unwrap();
    engine.core.pos.refresh_piece_counts();
    engine.core.pos.make_move(Color::Black, d3, true);
    let next = engine
        .book
        .check_forced_opening(&mut engine.core, Color::White, "d3c5f6")
        .expect("line continues");
    assert_eq!(format!("{next}"), "c5");

    // A board that consumed the whole line yields nothing.
    let c5: Square = "c5".parse().unwrap();
    engine.core.pos.make_move(Color::White, c5, true);
    assert!(
        engine
            .book
            .check_forced_opening(&mut engine.core, Color::Black, "d3c5")
            .is_none(),
        "line exhausted"
    );
}

#[test]
fn fill_endgame_hash_transfers_solved_nodes() {
    let mut engine = engine();

    // A one-empty position: all Black except a White disc at g8 and the
    // empty h8; Black to play h8 and win 64-0.
    let mut dump = String::new();
    for _ in 0..56 {
        dump.push('*');
    }
    dump.push_str("******O-");
    dump.push_str(" *");
    let side = engine.game_init(Some(&dump)).unwrap();
    assert_eq!(side, Color::Black);

    let parent = engine.book.insert_position(&engine.core.pos, Color::Black);
    let solved = (64 + CONFIRMED_WIN) as i16;
    engine.book.set_solve_status(parent, solved, solved, FULL_SOLVED | WLD_SOLVED);

    let h8: Square = "h8".parse().unwrap();
    engine.core.pos.refresh_piece_counts();
    engine.core.pos.make_move(Color::Black, h8, true);
    let child = engine.book.insert_position(&engine.core.pos, Color::White);
    engine.book.set_solve_status(child, solved, solved, FULL_SOLVED | WLD_SOLVED);
    engine.core.pos.unmake_move(Color::Black, h8);

    engine.core.pos.rehash(Color::Black);
    engine.book.fill_endgame_hash(&mut engine.core, 0);

    let entry = engine
        .core
        .tt
        .probe(engine.core.pos.hash(), ENDGAME_MODE)
        .expect("book knowledge reached the hash table");
    assert!(entry.flags & ENDGAME_SCORE != 0);
    assert!(entry.flags & EXACT_VALUE != 0);
    assert_eq!(entry.eval, 64);
    assert_eq!(entry.moves[0] as usize, h8.pos());
}

#[test]
fn doubly_optimal_line_stays_in_book() {
    let (mut engine, _) = learned_engine();
    engine.core.pos.reset();
    let line = engine.book.doubly_optimal_line(&mut engine.core, Color::Black);
    assert!(!line.is_empty());
    assert!(engine.core.pos.is_legal(line[0], Color::Black));
    assert_eq!(engine.core.pos.disks_played(), 0);
}
