//! End-to-end book tests: learning games, minimaxing, choosing moves.

use verso_core::{Color, generate_all};
use verso_engine::book::{NO_MOVE, NO_SCORE, POSITION_EXHAUSTED, WLD_SOLVED};
use verso_engine::{DrawMode, Engine};

fn engine() -> Engine {
    Engine::new(1, 14)
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

fn node_snapshot(engine: &Engine) -> Vec<(i32, i32, i16, i16, i16, i16)> {
    (0..engine.book.node_count())
        .map(|i| {
            let node = engine.book.node_at(i);
            (
                node.hash_val1,
                node.hash_val2,
                node.black_minimax_score,
                node.white_minimax_score,
                node.best_alternative_move,
                node.alternative_score,
            )
        })
        .collect()
}

#[test]
fn add_new_game_is_idempotent() {
    let mut engine = engine();
    let game = scripted_game(&mut engine);
    assert!(game.len() >= 55, "scripted game should run deep");

    engine
        .book
        .add_new_game(&mut engine.core, &game, 0, 0, 0, true, false)
        .unwrap();
    let count_once = engine.book.node_count();
    assert!(count_once > game.len() / 2);
    let snapshot_once = node_snapshot(&engine);

    engine
        .book
        .add_new_game(&mut engine.core, &game, 0, 0, 0, true, false)
        .unwrap();
    assert_eq!(engine.book.node_count(), count_once);
    assert_eq!(node_snapshot(&engine), snapshot_once);
}

#[test]
fn every_prefix_is_in_book_with_continuation() {
    let mut engine = engine();
    let game = scripted_game(&mut engine);
    engine
        .book
        .add_new_game(&mut engine.core, &game, 0, 0, 0, true, false)
        .unwrap();

    // Replay the game: each prefix position must be a book node, and the
    // played move must lead to another book node or be the recorded
    // deviation.
    engine.core.pos.reset();
    for &signed in &game {
        let side = if signed > 0 { Color::Black } else { Color::White };
        let index = engine
            .book
            .find_position(&engine.core.pos)
            .expect("prefix position is in book");
        let node = engine.book.node_at(index);
        assert!(
            node.is_solved()
                || node.best_alternative_move != NO_MOVE
                || node.alternative_score != NO_SCORE
                || node.best_alternative_move == POSITION_EXHAUSTED,
            "node {index} carries no information"
        );

        let raw = signed.unsigned_abs() as usize;
        let sq = verso_core::Square::from_pos(raw).unwrap();
        engine.core.pos.refresh_piece_counts();
        assert!(engine.core.pos.make_move(side, sq, true) > 0);
        assert!(
            engine.book.find_position(&engine.core.pos).is_some(),
            "successor along the game is in book"
        );
    }
    engine.core.pos.reset();
}

#[test]
fn minimax_tree_is_idempotent() {
    let mut engine = engine();
    let game = scripted_game(&mut engine);
    engine
        .book
        .add_new_game(&mut engine.core, &game, 0, 0, 0, true, false)
        .unwrap();

    engine.book.minimax_tree(&mut engine.core);
    let first = node_snapshot(&engine);
    engine.book.minimax_tree(&mut engine.core);
    let second = node_snapshot(&engine);
    assert_eq!(first, second);
}

#[test]
fn book_move_follows_learned_game() {
    let mut engine = engine();
    let game = scripted_game(&mut engine);
    engine
        .book
        .add_new_game(&mut engine.core, &game, 0, 0, 0, true, false)
        .unwrap();
    engine.book.minimax_tree(&mut engine.core);

    engine.core.pos.reset();
    engine.book.reset_book_search();
    engine.book.set_slack(0);
    engine
        .book
        .fill_move_alternatives(&mut engine.core, Color::Black, 0);
    assert!(engine.book.candidate_count() > 0);
    let (mv, eval) = engine.book.get_book_move(&mut engine.core, Color::Black, true);
    let mv = mv.expect("the learned line yields a book move");
    assert!(engine.core.pos.is_legal(mv, Color::Black));
    assert!(eval.is_book);
    // The board is restored after the PV walk.
    assert_eq!(engine.core.pos.disks_played(), 0);
}

#[test]
fn compute_move_uses_the_book() {
    let mut engine = engine();
    let game = scripted_game(&mut engine);
    engine
        .book
        .add_new_game(&mut engine.core, &game, 0, 0, 0, true, false)
        .unwrap();
    engine.book.minimax_tree(&mut engine.core);
    engine.game_init(None).unwrap();

    let (mv, eval) =
        engine.compute_move(Color::Black, true, 0.0, 0.0, false, true, 2, 0, 0, false);
    assert!(mv.is_some());
    assert!(eval.is_book, "move should come from the book");
}

#[test]
fn unwanted_draws_are_filtered() {
    let mut engine = engine();

    // Hand-build a two-node book: the initial position (unsolved) and
    // the position after d3, WLD-solved as a draw. All four opening
    // moves transpose into that child by symmetry.
    let _root = engine.book.insert_position(&engine.core.pos, Color::Black);

    let sq: verso_core::Square = "d3".parse().unwrap();
    engine.core.pos.make_move(Color::Black, sq, true);
    let child = engine.book.insert_position(&engine.core.pos, Color::White);
    engine.core.pos.unmake_move(Color::Black, sq);
    engine.book.set_solve_status(child, 0, 0, WLD_SOLVED);

    engine.book.set_draw_mode(DrawMode::OpponentWins);
    engine
        .book
        .fill_move_alternatives(&mut engine.core, Color::Black, 0);
    assert_eq!(engine.book.candidate_count(), 0, "draws must be avoided");

    engine.book.set_draw_mode(DrawMode::Neutral);
    engine
        .book
        .fill_move_alternatives(&mut engine.core, Color::Black, 0);
    assert_eq!(engine.book.candidate_count(), 4, "all four transpositions allowed");
}

#[test]
fn learned_book_roundtrips_through_files() {
    let mut engine = engine();
    let game = scripted_game(&mut engine);
    engine
        .book
        .add_new_game(&mut engine.core, &game, 0, 0, 0, true, false)
        .unwrap();
    engine.book.minimax_tree(&mut engine.core);
    let snapshot = node_snapshot(&engine);

    let mut path = std::env::temp_dir();
    path.push(format!("verso-learned-{}.bin", std::process::id()));
    let path = path.to_string_lossy().into_owned();
    engine.book.write_binary_database(&path).unwrap();

    let mut other = Engine::new(7, 12);
    other.book.read_binary_database(&path).unwrap();
    assert_eq!(node_snapshot(&other), snapshot);

    // A book from a file answers probes like the original.
    other.game_init(None).unwrap();
    other
        .book
        .fill_move_alternatives(&mut other.core, Color::Black, 0);
    assert!(other.book.candidate_count() > 0);
    std::fs::remove_file(&path).ok();
}
