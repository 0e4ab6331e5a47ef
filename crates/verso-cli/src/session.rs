//! The interactive driver: game loop, scripted sequences, tournaments,
//! analysis and learning.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use verso_core::{Color, HashPair, Square, game_in_progress, generate_all};
use verso_engine::book::{CONFIRMED_WIN, DEVIATION, FULL_SOLVED, WLD_SOLVED};
use verso_engine::{
    Coeffs, Engine, EvalResult, EvalType, Evaluation, GameMode, Learner,
};

use crate::error::CliError;
use crate::options::{INFINITE_TIME, Level, Options};
use crate::script;

/// Default file names, looked up in the working directory.
const BOOK_FILE: &str = "book.bin";
const COEFF_FILE: &str = "coeffs2.bin";
const ADJUST_FILE: &str = "adjust.txt";

/// Files holding the position and score of the game in progress.
const POSITION_FILE: &str = "current.gam";
const GAME_SCORE_FILE: &str = "current.mov";

/// Run the driver with parsed options.
pub fn run(options: &Options) -> Result<(), CliError> {
    if let Some((input, output)) = &options.script {
        if options.komi != 0 && !options.wld_only {
            return Err(CliError::Usage(
                "Komi can only be applied to WLD solves.\n".to_string(),
            ));
        }
        let mut engine = build_engine(options)?;
        return script::run_endgame_script(options, &mut engine, input, output);
    }
    if !options.tournament_levels.is_empty() {
        return tournament(options);
    }
    if options.analyze {
        return analyze_game(options);
    }
    play_session(options)
}

/// Construct and configure an engine per the options.
pub fn build_engine(options: &Options) -> Result<Engine, CliError> {
    // Script solving stays deterministic even with randomization on.
    let randomize = options.random && options.script.is_none();
    let seed = if randomize {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        1
    };
    let mut engine = Engine::new(seed, options.hash_bits);

    if Path::new(COEFF_FILE).exists() {
        let mut coeffs = Coeffs::from_file(COEFF_FILE)?;
        if let Ok(text) = std::fs::read_to_string(ADJUST_FILE) {
            let values: Vec<f64> =
                text.split_whitespace().filter_map(|token| token.parse().ok()).collect();
            if values.len() >= 4 {
                info!("applying evaluation adjustments from {ADJUST_FILE}");
                coeffs.apply_adjustments(values[0], values[1], values[2], values[3]);
            }
        }
        engine.set_coeffs(coeffs);
    } else {
        warn!("{COEFF_FILE} not found; evaluating by disc count only");
    }

    if options.use_book && Path::new(BOOK_FILE).exists() {
        engine.book.read_binary_database(BOOK_FILE)?;
        info!(nodes = engine.book.node_count(), "opening book loaded");
    }

    engine.book.set_draw_mode(options.draw_mode);
    engine.book.set_game_mode(if options.private_game {
        GameMode::Private
    } else {
        GameMode::Public
    });
    engine.set_komi(options.komi);

    Ok(engine)
}

/// Decode a predefined move sequence like `f4d6c3`.
fn parse_sequence(text: &str) -> Result<Vec<Square>, CliError> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.len() % 2 == 1 || cleaned.len() / 2 > 60 {
        return Err(CliError::IllegalScriptedMove { move_string: cleaned });
    }
    let mut moves = Vec::with_capacity(cleaned.len() / 2);
    for chunk in 0..cleaned.len() / 2 {
        let token = &cleaned[2 * chunk..2 * chunk + 2];
        let sq: Square = token
            .parse()
            .map_err(|_| CliError::IllegalScriptedMove { move_string: token.to_string() })?;
        moves.push(sq);
    }
    Ok(moves)
}

/// Read the per-game sequences of a `-seqfile` file, one per line.
fn load_sequence_lines(path: &str) -> Result<Vec<String>, CliError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| CliError::File { path: path.to_string(), source })?;
    Ok(text.lines().map(str::to_string).collect())
}

/// Ask for a player's parameters the way the prompts always worked:
/// a depth, then exact and WLD thresholds unless the depth was 0.
fn prompt_level(stdin: &std::io::Stdin, name: &str) -> Level {
    loop {
        print!("{name} parameters: ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() {
            continue;
        }
        let mut numbers = line.split_whitespace().filter_map(|t| t.parse::<i32>().ok());
        let Some(mid) = numbers.next() else { continue };
        if mid < 0 {
            continue;
        }
        if mid == 0 {
            return Level::HUMAN;
        }
        if let (Some(exact), Some(wld)) = (numbers.next(), numbers.next()) {
            return Level { mid, exact, wld };
        }
    }
}

/// The per-color levels: from `-l`, or prompted for interactively.
fn resolve_levels(options: &Options) -> [Level; 2] {
    let stdin = std::io::stdin();
    let black = options.levels[0].unwrap_or_else(|| prompt_level(&stdin, "Black"));
    let white = options.levels[1].unwrap_or_else(|| prompt_level(&stdin, "White"));
    [black, white]
}

/// The running game score, one row per Black move (or forced Black pass).
struct ScoreSheet {
    rows: Vec<[Option<Square>; 2]>,
}

impl ScoreSheet {
    fn new() -> ScoreSheet {
        ScoreSheet { rows: Vec::new() }
    }

    fn record(&mut self, side: Color, mv: Option<Square>) {
        match side {
            Color::Black => self.rows.push([mv, None]),
            Color::White => match self.rows.last_mut() {
                Some(row) if row[1].is_none() => row[1] = mv,
                _ => self.rows.push([None, mv]),
            },
        }
    }

    /// Write the numbered move list to disk.
    fn dump(&self) -> Result<(), CliError> {
        let file = File::create(GAME_SCORE_FILE).map_err(|source| CliError::File {
            path: GAME_SCORE_FILE.to_string(),
            source,
        })?;
        let mut stream = std::io::BufWriter::new(file);
        let emit = |stream: &mut dyn Write| -> std::io::Result<()> {
            for (i, row) in self.rows.iter().enumerate() {
                let cell = |mv: Option<Square>| {
                    mv.map_or_else(|| "- ".to_string(), |sq| sq.to_string())
                };
                writeln!(stream, "   {:2}.    {}  {}", i + 1, cell(row[0]), cell(row[1]))?;
            }
            Ok(())
        };
        emit(&mut stream).map_err(|source| CliError::File {
            path: GAME_SCORE_FILE.to_string(),
            source,
        })
    }
}

/// Save the current board position to disk.
fn dump_position(engine: &Engine, side: Color) -> Result<(), CliError> {
    let mut text = String::with_capacity(100);
    for row in 1..=8 {
        for col in 1..=8 {
            text.push(match engine.core.pos.cell(10 * row + col) {
                verso_core::Cell::Black => 'X',
                verso_core::Cell::White => 'O',
                _ => '-',
            });
        }
    }
    text.push('\n');
    text.push_str(if side == Color::Black { "Black" } else { "White" });
    text.push_str(" to move\nThis file was automatically generated\n");
    std::fs::write(POSITION_FILE, text).map_err(|source| CliError::File {
        path: POSITION_FILE.to_string(),
        source,
    })
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

fn play_session(options: &Options) -> Result<(), CliError> {
    let mut engine = build_engine(options)?;
    let mut learner = Learner::new();
    let levels = resolve_levels(options);

    let sequence_lines = match &options.sequence_file {
        Some(path) => load_sequence_lines(path)?,
        None => Vec::new(),
    };

    let repeat = options.repeat.max(1);
    let mut time_left = options.time;
    for game_index in 0..repeat {
        // With a sequence file every game reads its own line; the last
        // line keeps serving once the file runs out.
        let sequence = if sequence_lines.is_empty() {
            options.sequence.clone()
        } else {
            sequence_lines
                .get(game_index)
                .or_else(|| sequence_lines.last())
                .cloned()
        };
        let last_game = game_index + 1 == repeat;
        play_one_game(
            options,
            &mut engine,
            &mut learner,
            levels,
            sequence.as_deref(),
            &mut time_left,
            last_game,
        )?;
        if options.test_only {
            break;
        }
    }
    Ok(())
}

/// Play one game between the configured players; returns the final
/// (black, white) disc counts.
#[allow(clippy::too_many_arguments)]
fn play_one_game(
    options: &Options,
    engine: &mut Engine,
    learner: &mut Learner,
    levels: [Level; 2],
    move_string: Option<&str>,
    time_left: &mut [f64; 2],
    save_book: bool,
) -> Result<(i32, i32), CliError> {
    let provided = match move_string {
        Some(text) => parse_sequence(text)?,
        None => Vec::new(),
    };

    let game_dump = match &options.game_file {
        Some(path) => Some(std::fs::read_to_string(path).map_err(|source| {
            CliError::File { path: path.clone(), source }
        })?),
        None => None,
    };
    let mut side = engine.game_init(game_dump.as_deref())?;
    engine.core.tt.clear();
    learner.clear_stored_game();

    if options.echo && options.use_book {
        println!("Book randomness: {:.2} disks", options.slack);
    }
    engine.book.set_slack((options.slack * 128.0).floor() as i32);
    engine.toggle_oracle_openings(false);
    if let Some((depth, cutoff)) = options.learn {
        learner.set_learning_parameters(depth, cutoff);
    }
    engine.book.reset_book_search();
    let (low, high, bonus) = options.deviation.unwrap_or((0, 0, 0.0));
    engine.book.set_deviation_value(low, high, bonus);

    let mut sheet = ScoreSheet::new();
    let mut move_vec = String::new();
    let mut rand_color = Color::Black;
    let stdin = std::io::stdin();

    while game_in_progress(&engine.core.pos) {
        let moves = generate_all(&engine.core.pos, side);

        if moves.is_empty() {
            sheet.record(side, None);
            if levels[side.index()].is_human() {
                println!("You must pass - please press Enter");
                let mut pause = String::new();
                let _ = stdin.lock().read_line(&mut pause);
            }
            side = side.opponent();
            if options.test_only {
                break;
            }
            continue;
        }

        let move_start = std::time::Instant::now();
        engine.core.control.clear_panic_abort();

        if options.echo {
            println!("{}", engine.core.pos.pretty());
            println!("{side} to move");
        }
        dump_position(engine, side)?;
        sheet.dump()?;
        if options.echo && options.wait {
            let mut pause = String::new();
            let _ = stdin.lock().read_line(&mut pause);
        }

        let level = levels[side.index()];
        let disks_played = engine.core.pos.disks_played();
        let (chosen, eval) = if disks_played < provided.len() {
            let forced = provided[disks_played];
            if !engine.core.pos.is_legal(forced, side) {
                return Err(CliError::IllegalScriptedMove { move_string: forced.to_string() });
            }
            (forced, None)
        } else if level.is_human() {
            if options.use_book && options.display_pv {
                engine.book.fill_move_alternatives(&mut engine.core, side, 0);
                if options.echo {
                    print_book_alternatives(engine);
                }
            }
            (prompt_for_move(&stdin, engine, side)?, None)
        } else {
            let timed_search = level.mid >= 60;
            let (mv, eval) = engine.compute_move(
                side,
                true,
                time_left[side.index()],
                options.increment[side.index()],
                timed_search,
                options.use_book,
                level.mid,
                level.exact,
                level.wld,
                false,
            );
            let mut chosen = mv.expect("legal moves exist");
            // Random book-move override, alternating between the colors.
            if let Some(freq) = options.rand_move_freq {
                if eval.is_book
                    && freq > 0
                    && side == rand_color
                    && engine.random_u32() % freq == 0
                {
                    println!("Engine override: Random move selected.");
                    rand_color = rand_color.opponent();
                    chosen = moves[(engine.random_u32() % moves.len() as u32) as usize];
                }
            }
            (chosen, Some(eval))
        };

        if time_left[side.index()] != INFINITE_TIME {
            time_left[side.index()] = (time_left[side.index()]
                - move_start.elapsed().as_secs_f64()
                + options.increment[side.index()])
            .max(0.0);
        }

        if options.echo {
            if let Some(eval) = &eval {
                println!("--> {chosen}  {}", eval_text(eval));
                if options.display_pv {
                    let line: Vec<String> =
                        engine.pv().iter().map(|sq| sq.to_string()).collect();
                    println!("    pv: {}", line.join(" "));
                }
            } else {
                println!("--> {chosen}");
            }
        }

        learner.store_move(disks_played, chosen);
        move_vec.push_str(&chosen.to_string());
        engine.core.pos.refresh_piece_counts();
        engine.core.pos.apply(side, chosen, true)?;
        sheet.record(side, Some(chosen));

        side = side.opponent();
        if options.test_only {
            break;
        }
    }

    sheet.dump()?;

    engine.core.pos.refresh_piece_counts();
    let black = engine.core.pos.disc_count(Color::Black);
    let white = engine.core.pos.disc_count(Color::White);

    if !options.echo && !options.test_only {
        println!();
        println!("Black level: {}", levels[0].mid);
        println!("White level: {}", levels[1].mid);
    }
    println!("\nBlack: {black}   White: {white}");
    println!("Nodes searched:        {}", engine.core.state.total_nodes);
    println!("Positions evaluated:   {}", engine.core.state.total_evaluations);

    if let Some(path) = &options.log_file {
        if !options.test_only {
            let log = OpenOptions::new().create(true).append(true).open(path);
            if let Ok(mut log) = log {
                let _ = writeln!(log, "# {}", unix_timestamp());
                let _ = writeln!(log, "#     {black:2} - {white:2}");
                let _ = writeln!(log, "{move_vec}");
            }
        }
    }

    if options.learn.is_some() && !options.test_only {
        let length = engine.core.pos.disks_played();
        // A game between two engines goes into the private book.
        let private = !levels[0].is_human() && !levels[1].is_human();
        let exact_cutoff = levels.iter().map(|level| level.exact).max().unwrap_or(0).max(0);
        let wld_cutoff = levels.iter().map(|level| level.wld).max().unwrap_or(0).max(0);
        learner.learn_game(
            engine,
            length,
            private,
            exact_cutoff as usize,
            wld_cutoff as usize,
            if save_book { Some((BOOK_FILE, true)) } else { None },
        )?;
    }

    Ok((black, white))
}

fn prompt_for_move(
    stdin: &std::io::Stdin,
    engine: &Engine,
    side: Color,
) -> Result<Square, CliError> {
    loop {
        print!("{side}: ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() {
            continue;
        }
        let token = line.trim();
        if let Ok(sq) = token.parse::<Square>() {
            if engine.core.pos.is_legal(sq, side) {
                return Ok(sq);
            }
        }
        println!("'{token}' is not a legal move");
    }
}

/// List the book alternatives gathered for the position at hand.
fn print_book_alternatives(engine: &Engine) {
    for i in 0..engine.book.candidate_count() {
        let candidate = engine.book.candidate(i);
        let mut score = candidate.score;
        if score >= CONFIRMED_WIN {
            score -= CONFIRMED_WIN;
        } else if score <= -CONFIRMED_WIN {
            score += CONFIRMED_WIN;
        }
        if candidate.flags & FULL_SOLVED != 0 {
            println!("   {}   {:+}  (exact score)", candidate.mv, score);
        } else if candidate.flags & WLD_SOLVED != 0 {
            println!("   {}   {:+}  (W/L/D solved)", candidate.mv, score);
        } else if candidate.flags & DEVIATION != 0 {
            println!("   {}   {:+.2}  (deviation)", candidate.mv, score as f64 / 128.0);
        } else {
            println!("   {}   {:+.2}", candidate.mv, score as f64 / 128.0);
        }
    }
}

/// Human-readable form of an evaluation.
pub fn eval_text(eval: &Evaluation) -> String {
    match eval.kind {
        EvalType::Midgame => format!("{:+.2}", eval.score as f64 / 128.0),
        EvalType::Exact => format!("{:+} (exact)", eval.score / 128),
        EvalType::Wld => {
            let verdict = match eval.res {
                EvalResult::Won => "win",
                EvalResult::Drawn => "draw",
                EvalResult::Lost => "loss",
                EvalResult::Unsolved => "unsolved",
            };
            format!("{verdict} (WLD)")
        }
        EvalType::Selective => {
            format!("{:+.2} @ {:.0}%", eval.score as f64 / 128.0, eval.confidence * 100.0)
        }
        EvalType::Forced => "forced".to_string(),
        EvalType::Pass => "pass".to_string(),
        EvalType::Interrupted => "interrupted".to_string(),
        EvalType::Undefined | EvalType::Uninitialized => String::new(),
    }
}

/// Round-robin tournament over the `-t` levels. Every ordered pairing is
/// played, self-matches included; ties score half a point to each side.
fn tournament(options: &Options) -> Result<(), CliError> {
    const MAX_TOURNAMENT_SIZE: usize = 8;

    let levels: Vec<Level> = options
        .tournament_levels
        .iter()
        .copied()
        .take(MAX_TOURNAMENT_SIZE)
        .collect();
    let count = levels.len();
    let mut results = vec![vec![(0i32, 0i32); count]; count];
    let mut score = vec![0.0f64; count];
    let mut color_score = [0.0f64; 2];

    let mut engine = build_engine(options)?;
    let mut learner = Learner::new();
    let mut time_left = options.time;

    for black in 0..count {
        for white in 0..count {
            let pairing = [levels[black], levels[white]];
            let (black_discs, white_discs) = play_one_game(
                options,
                &mut engine,
                &mut learner,
                pairing,
                options.sequence.as_deref(),
                &mut time_left,
                true,
            )?;
            results[black][white] = (black_discs, white_discs);
            if black_discs > white_discs {
                score[black] += 1.0;
                color_score[0] += 1.0;
            } else if black_discs == white_discs {
                score[black] += 0.5;
                score[white] += 0.5;
                color_score[0] += 0.5;
                color_score[1] += 0.5;
            } else {
                score[white] += 1.0;
                color_score[1] += 1.0;
            }
        }
    }

    println!("\nCompetitors:");
    for (index, level) in levels.iter().enumerate() {
        println!("  Player {:2}: {}-{}-{}", index + 1, level.mid, level.exact, level.wld);
    }
    print!("\n       ");
    for index in 0..count {
        print!(" {:2}    ", index + 1);
    }
    println!("  Score");
    for (i, row) in results.iter().enumerate() {
        print!("  {:2}   ", i + 1);
        for &(black_discs, white_discs) in row {
            print!("{black_discs:2}-{white_discs:2}  ");
        }
        println!("  {:4.1}", score[i]);
    }
    println!();
    println!("Black score: {:.1}", color_score[0]);
    println!("White score: {:.1}", color_score[1]);
    Ok(())
}

/// Analyze every position of the provided game: score the move actually
/// played and the engine's preferred move, writing paired results to
/// `analysis.log`. Midgame scores average two search depths to dampen
/// odd/even oscillation; parallel hash transformations keep the "played"
/// and "best" search trees from clashing in the table.
fn analyze_game(options: &Options) -> Result<(), CliError> {
    let mut engine = build_engine(options)?;
    let levels = resolve_levels(options);
    let provided = match &options.sequence {
        Some(text) => parse_sequence(text)?,
        None => Vec::new(),
    };

    let log_path = "analysis.log";
    let output = File::create(log_path)
        .map_err(|source| CliError::File { path: log_path.to_string(), source })?;
    let mut output = std::io::BufWriter::new(output);

    if options.echo {
        println!("Analyzing provided game...");
    }
    let mut side = engine.game_init(None)?;
    engine.core.tt.clear();

    if options.echo && options.use_book {
        println!("Disabling usage of opening book");
    }
    let use_book = false;
    engine.book.reset_book_search();

    let best_trans = HashPair::new(engine.random_u32(), engine.random_u32());
    let played_trans = HashPair::new(engine.random_u32(), engine.random_u32());

    let mut sheet = ScoreSheet::new();

    while game_in_progress(&engine.core.pos)
        && engine.core.pos.disks_played() < provided.len()
    {
        let moves = generate_all(&engine.core.pos, side);
        if moves.is_empty() {
            sheet.record(side, None);
            side = side.opponent();
            continue;
        }

        engine.core.control.clear_panic_abort();
        if options.echo {
            println!("{}", engine.core.pos.pretty());
            println!("{side} to move");
        }

        let level = levels[side.index()];
        let timed_search = level.mid >= 60;
        let disks_played = engine.core.pos.disks_played();
        let empties = 60 - disks_played as i32;
        let opponent = side.opponent();
        let curr_move = provided[disks_played];
        let my_time = INFINITE_TIME;
        let my_incr = 0.0;

        // The score for the move actually played, through the opponent's
        // reply. A private hash transformation keeps this tree separate
        // so all scores stay comparable.
        engine.core.tt.set_transformation(played_trans);
        engine.core.pos.apply(side, curr_move, true)?;
        let mut played_info1 = Evaluation::undefined();
        if empties > level.wld {
            let (_, info) = engine.compute_move(
                opponent, false, my_time, my_incr, timed_search, use_book,
                level.mid - 2, level.exact - 1, level.wld - 1, true,
            );
            played_info1 = info;
        }
        let (resp_move, played_info2) = engine.compute_move(
            opponent, false, my_time, my_incr, timed_search, use_book,
            level.mid - 1, level.exact - 1, level.wld - 1, true,
        );
        engine.core.pos.unmake_move(side, curr_move);

        // The best move and its score, searched twice in the midgame to
        // dampen oscillations.
        let mut best_info1 = Evaluation::undefined();
        if empties > level.wld {
            engine.core.tt.set_transformation(best_trans);
            let (_, info) = engine.compute_move(
                side, false, my_time, my_incr, timed_search, use_book,
                level.mid - 1, level.exact, level.wld, true,
            );
            best_info1 = info;
        }
        let (best_move, best_info2) = engine.compute_move(
            side, false, my_time, my_incr, timed_search, use_book,
            level.mid, level.exact, level.wld, true,
        );
        let best_move = best_move.expect("legal moves exist");

        // Output the two score-move pairs.
        let emit = |output: &mut dyn Write| -> std::io::Result<()> {
            write!(output, "{best_move} ")?;
            if empties <= level.exact {
                write!(output, "{:+6}", best_info2.score / 128)?;
            } else if empties <= level.wld {
                match best_info2.res {
                    EvalResult::Won => write!(output, "    +1")?,
                    EvalResult::Lost => write!(output, "    -1")?,
                    _ => write!(output, "     0")?,
                }
            } else if best_move == curr_move && resp_move.is_some() {
                // The played move is the best: reuse its score so the
                // depth-averaged values coincide.
                write!(
                    output,
                    "{:6.2}",
                    -(played_info1.score + played_info2.score) as f64 / (2.0 * 128.0)
                )?;
            } else {
                write!(
                    output,
                    "{:6.2}",
                    (best_info1.score + best_info2.score) as f64 / (2.0 * 128.0)
                )?;
            }

            write!(output, "       {curr_move} ")?;
            if resp_move.is_none() {
                write!(output, "     ?")?;
            } else if empties <= level.exact {
                write!(output, "{:+6}", -played_info2.score / 128)?;
            } else if empties <= level.wld {
                match played_info2.res {
                    EvalResult::Won => write!(output, "    -1")?,
                    EvalResult::Lost => write!(output, "    +1")?,
                    _ => write!(output, "     0")?,
                }
            } else {
                write!(
                    output,
                    "{:6.2}",
                    -(played_info1.score + played_info2.score) as f64 / (2.0 * 128.0)
                )?;
            }
            writeln!(output)
        };
        emit(&mut output)
            .map_err(|source| CliError::File { path: log_path.to_string(), source })?;

        engine.core.pos.refresh_piece_counts();
        engine.core.pos.apply(side, curr_move, true)?;
        sheet.record(side, Some(curr_move));
        side = side.opponent();
    }

    engine.core.tt.set_transformation(HashPair::ZERO);
    sheet.dump()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{eval_text, parse_sequence};
    use verso_engine::{EvalResult, EvalType, Evaluation};

    #[test]
    fn sequence_parsing() {
        let moves = parse_sequence("d3c5f6").unwrap();
        assert_eq!(moves.len(), 3);
        assert_eq!(format!("{}", moves[0]), "d3");
        assert_eq!(format!("{}", moves[2]), "f6");
    }

    #[test]
    fn sequence_rejects_garbage() {
        assert!(parse_sequence("d3zz").is_err());
        assert!(parse_sequence("d3c").is_err());
    }

    #[test]
    fn eval_text_formats() {
        let midgame =
            Evaluation::new(EvalType::Midgame, EvalResult::Unsolved, 256, 0.0, 8, false);
        assert_eq!(eval_text(&midgame), "+2.00");
        let exact = Evaluation::new(EvalType::Exact, EvalResult::Won, 128 * 16, 1.0, 14, false);
        assert_eq!(eval_text(&exact), "+16 (exact)");
        let wld = Evaluation::new(EvalType::Wld, EvalResult::Won, 128, 1.0, 20, false);
        assert_eq!(eval_text(&wld), "win (WLD)");
    }
}
