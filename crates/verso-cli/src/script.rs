//! Batch endgame solving of a position script.
//!
//! Script lines starting with `%` are comments and are copied to the
//! output verbatim (the marker line `% End of the endgame script` stops
//! the run). Every other line holds a position dump plus side to move and
//! is replaced in the output by the solver verdict, which is exactly what
//! `merge_position_list` consumes.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};

use tracing::info;

use verso_engine::{Engine, EvalType, PvStep};

use crate::error::CliError;
use crate::options::{INFINITE_TIME, Options};

/// Comment line that terminates the script.
const END_MARKER: &str = "% End of the endgame script";

/// Solve every position in `input`, writing the results to `output`.
pub fn run_endgame_script(
    options: &Options,
    engine: &mut Engine,
    input: &str,
    output: &str,
) -> Result<(), CliError> {
    let in_file =
        File::open(input).map_err(|source| CliError::File { path: input.to_string(), source })?;
    let out_file = File::create(output)
        .map_err(|source| CliError::File { path: output.to_string(), source })?;
    let mut out = BufWriter::new(out_file);
    let out_error =
        |source: std::io::Error| CliError::File { path: output.to_string(), source };

    let mid = 60;
    let exact = if options.wld_only { 0 } else { 60 };
    let wld = 60;

    let mut position_count = 0;
    for line in BufReader::new(in_file).lines() {
        let line =
            line.map_err(|source| CliError::File { path: input.to_string(), source })?;

        if line.starts_with('%') {
            writeln!(&mut out, "{line}").map_err(out_error)?;
            if line.starts_with(END_MARKER) {
                break;
            }
            continue;
        }

        // A position line: fresh search state per position.
        engine.game_init(None)?;
        engine.book.set_slack(0);
        engine.toggle_oracle_openings(false);
        engine.book.reset_book_search();
        engine.book.set_deviation_value(0, 60, 0.0);
        engine.core.tt.clear();
        let mut side = engine.core.pos.set_from_dump(&line)?;
        position_count += 1;

        let mut pass_count = 0;
        let (mut best, mut eval) = engine.compute_move(
            side,
            true,
            INFINITE_TIME,
            0.0,
            false,
            options.use_book,
            mid,
            exact,
            wld,
            true,
        );
        if best.is_none() {
            if eval.kind == EvalType::Pass {
                // The mover passes: solve for the opponent instead.
                pass_count = 1;
                side = side.opponent();
                let (second_best, second_eval) = engine.compute_move(
                    side,
                    true,
                    INFINITE_TIME,
                    0.0,
                    false,
                    options.use_book,
                    mid,
                    exact,
                    wld,
                    true,
                );
                best = second_best;
                eval = second_eval;
                if best.is_none() {
                    pass_count = 2;
                }
            } else {
                // Game over: the driver already scored it exactly.
                pass_count = 2;
            }
        }

        // The verdict, from Black's point of view.
        let score = eval.score / 128;
        if options.wld_only {
            let black_relative = side.sign() * score;
            let verdict = if black_relative > 0 {
                "Black win"
            } else if black_relative == 0 {
                "Draw"
            } else {
                "White win"
            };
            write!(&mut out, "{verdict}").map_err(out_error)?;
        } else {
            let (black, white) = if side == verso_core::Color::Black {
                (32 + score / 2, 32 - score / 2)
            } else {
                (32 - score / 2, 32 + score / 2)
            };
            write!(&mut out, "{black:2} - {white:2}").map_err(out_error)?;
        }

        // Optionally the optimal line, pass markers included.
        if options.show_opening_line && pass_count != 2 {
            write!(&mut out, "   ").map_err(out_error)?;
            if pass_count == 1 {
                write!(&mut out, " --").map_err(out_error)?;
            }
            for step in engine.full_pv() {
                match step {
                    PvStep::Move(sq) => write!(&mut out, " {sq}").map_err(out_error)?,
                    PvStep::Pass => write!(&mut out, " --").map_err(out_error)?,
                }
            }
        }

        // Copy any trailing comment from the script line.
        if let Some(index) = line.find('%') {
            writeln!(&mut out, "      {}", &line[index..]).map_err(out_error)?;
        } else {
            writeln!(&mut out).map_err(out_error)?;
        }
    }

    info!(input, output, solved = position_count, "endgame script processed");
    println!("Total positions solved:   {position_count}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::run_endgame_script;
    use crate::options::Options;
    use crate::session::build_engine;

    fn temp(name: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("verso-script-{}-{name}", std::process::id()));
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn solves_a_one_empty_script() {
        // One position: everything black except a white disc at g8 and an
        // empty h8; Black to play h8 and win 64-0.
        let mut board = String::new();
        for _ in 0..56 {
            board.push('X');
        }
        board.push_str("XXXXXXO-");
        let script = format!("% h8\n% 0 0\n{board} X\n%\n");

        let input = temp("in.pos");
        let output = temp("out.txt");
        std::fs::write(&input, script).unwrap();

        let options = Options {
            wld_only: false,
            show_opening_line: true,
            random: false,
            ..Options::default()
        };
        let mut engine = build_engine(&options).unwrap();
        run_endgame_script(&options, &mut engine, &input, &output).unwrap();

        let result = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "% h8");
        assert_eq!(lines[1], "% 0 0");
        assert!(lines[2].starts_with("64 -  0"), "got {:?}", lines[2]);
        assert!(lines[2].contains("h8"));
        assert_eq!(lines[3], "%");

        std::fs::remove_file(&input).ok();
        std::fs::remove_file(&output).ok();
    }

    #[test]
    fn wld_script_reports_the_winner() {
        let mut board = String::new();
        for _ in 0..56 {
            board.push('X');
        }
        board.push_str("XXXXXXO-");
        let script = format!("{board} X\n% End of the endgame script\n");

        let input = temp("wld-in.pos");
        let output = temp("wld-out.txt");
        std::fs::write(&input, script).unwrap();

        let options = Options { wld_only: true, random: false, ..Options::default() };
        let mut engine = build_engine(&options).unwrap();
        run_endgame_script(&options, &mut engine, &input, &output).unwrap();

        let result = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(lines[0], "Black win");
        assert_eq!(lines[1], "% End of the endgame script");

        std::fs::remove_file(&input).ok();
        std::fs::remove_file(&output).ok();
    }
}
