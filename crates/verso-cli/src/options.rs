//! Command-line parsing.
//!
//! The option surface is token-oriented: `-l` takes a variable number of
//! values depending on the depths given, which rules out a declarative
//! parser. Unknown tokens yield the usage banner and exit status 1.

use verso_engine::DrawMode;

use crate::error::CliError;

/// Search limits for one player. Depth 0 means human input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    pub mid: i32,
    pub exact: i32,
    pub wld: i32,
}

impl Level {
    pub const HUMAN: Level = Level { mid: 0, exact: 0, wld: 0 };

    pub fn is_human(&self) -> bool {
        self.mid == 0
    }
}

/// Everything the driver accepts on the command line. The defaults mirror
/// the original engine's: randomization on, book on, a quarter disc of
/// book slack, exact script solves, and unset player levels (the driver
/// prompts for them).
#[derive(Debug, Clone)]
pub struct Options {
    pub echo: bool,
    pub hash_bits: u32,
    /// Per-color levels; `None` means not given on the command line.
    pub levels: [Option<Level>; 2],
    pub display_pv: bool,
    pub random: bool,
    pub tournament_levels: Vec<Level>,
    pub use_timer: bool,
    pub time: [f64; 2],
    pub increment: [f64; 2],
    pub wait: bool,
    pub use_book: bool,
    pub game_file: Option<String>,
    pub learn: Option<(i32, usize)>,
    /// Book randomness in discs.
    pub slack: f64,
    pub deviation: Option<(i32, i32, f64)>,
    pub log_file: Option<String>,
    pub private_game: bool,
    pub draw_mode: DrawMode,
    pub test_only: bool,
    pub sequence: Option<String>,
    pub sequence_file: Option<String>,
    pub repeat: usize,
    pub thor_threshold: Option<usize>,
    pub analyze: bool,
    pub rand_move_freq: Option<u32>,
    pub wld_only: bool,
    pub show_opening_line: bool,
    pub script: Option<(String, String)>,
    pub komi: i32,
}

/// A game clock that in practice never runs out.
pub const INFINITE_TIME: f64 = 10_000_000.0;

const DEFAULT_HASH_BITS: u32 = 18;
const DEFAULT_RANDOM: bool = true;
const DEFAULT_SLACK: f64 = 0.25;
const DEFAULT_WLD_ONLY: bool = false;

impl Default for Options {
    fn default() -> Options {
        Options {
            echo: true,
            hash_bits: DEFAULT_HASH_BITS,
            levels: [None; 2],
            display_pv: true,
            random: DEFAULT_RANDOM,
            tournament_levels: Vec::new(),
            use_timer: false,
            time: [INFINITE_TIME; 2],
            increment: [0.0; 2],
            wait: false,
            use_book: true,
            game_file: None,
            learn: None,
            slack: DEFAULT_SLACK,
            deviation: None,
            log_file: None,
            private_game: true,
            draw_mode: DrawMode::OpponentWins,
            test_only: false,
            sequence: None,
            sequence_file: None,
            repeat: 1,
            thor_threshold: None,
            analyze: false,
            rand_move_freq: None,
            wld_only: DEFAULT_WLD_ONLY,
            show_opening_line: false,
            script: None,
            komi: 0,
        }
    }
}

/// The usage banner shown for any malformed command line.
pub fn usage() -> String {
    let mut banner = String::from("Usage: verso [options]\n");
    for line in [
        "  -e <0|1>             toggle status output (default 1)",
        "  -g <game file>       load the starting position from a file",
        "  -h <n>               hash table size, 2^n slots (default 18)",
        "  -l <bd> [<be> <bw>] <wd> [<we> <ww>]",
        "                       per-color midgame depth and endgame",
        "                       thresholds; depth 0 = human input",
        "  -p <0|1>             toggle PV display (default 1)",
        "  -r <0|1>             randomize play (default 1)",
        "  -t <k> <triples...>  round-robin tournament of k levels",
        "  -time <bt> <bi> <wt> <wi>",
        "                       game clocks (seconds) and increments",
        "  -w <0|1>             wait for a key between moves (default 0)",
        "  -b <0|1>             use the opening book (default 1)",
        "  -learn <depth> <cutoff>",
        "                       learn played games into the book",
        "  -slack <disks>       book randomness (default 0.25)",
        "  -dev <low> <high> <bonus>",
        "                       early-deviation bonus window",
        "  -log <file>          append game results to a log file",
        "  -private / -public   book learning visibility",
        "  -keepdraw / -draw2black / -draw2white / -draw2none",
        "                       book draw handling",
        "  -test                evaluate one position, then exit",
        "  -seq <movestr>       force an initial move sequence",
        "  -seqfile <path>      as -seq, one sequence per line per game",
        "  -repeat <n>          play n games",
        "  -thor <k>            opening-oracle match threshold",
        "  -analyze             analyze all positions of the sequence",
        "  -randmove <freq>     random book move once every freq moves",
        "  -wld <0|1>           endgame script solves WLD only (default 0)",
        "  -line <0|1>          output the optimal line in script solves",
        "  -script <in> <out>   solve an endgame position script",
        "  -komi <n>            endgame komi (WLD script solves only)",
    ] {
        banner.push_str(line);
        banner.push('\n');
    }
    banner
}

fn usage_error() -> CliError {
    CliError::Usage(usage())
}

struct Tokens<'a> {
    args: &'a [String],
    index: usize,
}

impl<'a> Tokens<'a> {
    fn next(&mut self) -> Option<&'a str> {
        let token = self.args.get(self.index)?;
        self.index += 1;
        Some(token)
    }

    fn number<T: std::str::FromStr>(&mut self) -> Result<T, CliError> {
        self.next().ok_or_else(usage_error)?.parse().map_err(|_| usage_error())
    }

    fn string(&mut self) -> Result<String, CliError> {
        Ok(self.next().ok_or_else(usage_error)?.to_string())
    }

    fn flag(&mut self) -> Result<bool, CliError> {
        match self.next() {
            Some("0") => Ok(false),
            Some("1") => Ok(true),
            _ => Err(usage_error()),
        }
    }

    /// One level spec: depth, plus exact/WLD thresholds unless human.
    fn level(&mut self) -> Result<Level, CliError> {
        let mid: i32 = self.number()?;
        if mid == 0 {
            return Ok(Level::HUMAN);
        }
        let exact: i32 = self.number()?;
        let wld: i32 = self.number()?;
        Ok(Level { mid, exact, wld })
    }
}

/// Parse a command line.
pub fn parse(args: &[String]) -> Result<Options, CliError> {
    let mut options = Options::default();
    let mut tokens = Tokens { args, index: 0 };

    while let Some(token) = tokens.next() {
        match token {
            "-e" => options.echo = tokens.flag()?,
            "-g" => options.game_file = Some(tokens.string()?),
            "-h" => {
                let bits: u32 = tokens.number()?;
                if bits < 1 {
                    return Err(usage_error());
                }
                options.hash_bits = bits;
            }
            "-l" => {
                // A level spec overrides an earlier tournament request.
                options.tournament_levels.clear();
                options.levels[0] = Some(tokens.level()?);
                options.levels[1] = Some(tokens.level()?);
            }
            "-p" => options.display_pv = tokens.flag()?,
            "-r" => options.random = tokens.flag()?,
            "-t" => {
                let count: usize = tokens.number()?;
                options.tournament_levels.clear();
                for _ in 0..count {
                    options.tournament_levels.push(tokens.level()?);
                }
            }
            "-time" => {
                options.time[0] = tokens.number()?;
                options.increment[0] = tokens.number()?;
                options.time[1] = tokens.number()?;
                options.increment[1] = tokens.number()?;
                options.use_timer = true;
            }
            "-w" => options.wait = tokens.flag()?,
            "-b" => options.use_book = tokens.flag()?,
            "-learn" => {
                let depth: i32 = tokens.number()?;
                let cutoff: usize = tokens.number()?;
                options.learn = Some((depth, cutoff));
            }
            "-slack" => options.slack = tokens.number()?,
            "-dev" => {
                let low: i32 = tokens.number()?;
                let high: i32 = tokens.number()?;
                let bonus: f64 = tokens.number()?;
                options.deviation = Some((low, high, bonus));
            }
            "-log" => options.log_file = Some(tokens.string()?),
            "-private" => options.private_game = true,
            "-public" => options.private_game = false,
            "-keepdraw" => options.draw_mode = DrawMode::Neutral,
            "-draw2black" => options.draw_mode = DrawMode::BlackWins,
            "-draw2white" => options.draw_mode = DrawMode::WhiteWins,
            "-draw2none" => options.draw_mode = DrawMode::OpponentWins,
            "-test" => options.test_only = true,
            "-seq" => options.sequence = Some(tokens.string()?),
            "-seqfile" => options.sequence_file = Some(tokens.string()?),
            "-repeat" => options.repeat = tokens.number()?,
            "-thor" => options.thor_threshold = Some(tokens.number()?),
            "-analyze" => options.analyze = true,
            "-randmove" => options.rand_move_freq = Some(tokens.number()?),
            "-wld" => options.wld_only = tokens.flag()?,
            "-line" => options.show_opening_line = tokens.flag()?,
            "-script" => {
                let input = tokens.string()?;
                let output = tokens.string()?;
                options.script = Some((input, output));
            }
            "-komi" => options.komi = tokens.number()?,
            "?" | "-help" | "--help" | "-?" => return Err(usage_error()),
            _ => return Err(usage_error()),
        }
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::{INFINITE_TIME, Level, parse};
    use crate::error::CliError;
    use verso_engine::DrawMode;

    fn args(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn defaults() {
        let options = parse(&[]).unwrap();
        assert!(options.use_book);
        assert!(options.echo);
        assert!(options.random);
        assert!(!options.wld_only);
        assert_eq!(options.hash_bits, 18);
        assert_eq!(options.levels, [None, None]);
        assert_eq!(options.slack, 0.25);
        assert_eq!(options.time, [INFINITE_TIME; 2]);
        assert_eq!(options.draw_mode, DrawMode::OpponentWins);
    }

    #[test]
    fn level_parsing_with_thresholds() {
        let options = parse(&args("-l 8 16 18 0")).unwrap();
        assert_eq!(options.levels[0], Some(Level { mid: 8, exact: 16, wld: 18 }));
        assert_eq!(options.levels[1], Some(Level::HUMAN));
    }

    #[test]
    fn level_parsing_two_engines() {
        let options = parse(&args("-l 4 10 12 6 14 16")).unwrap();
        assert_eq!(options.levels[0], Some(Level { mid: 4, exact: 10, wld: 12 }));
        assert_eq!(options.levels[1], Some(Level { mid: 6, exact: 14, wld: 16 }));
    }

    #[test]
    fn level_overrides_tournament() {
        let options = parse(&args("-t 1 4 8 10 -l 2 6 8 0")).unwrap();
        assert!(options.tournament_levels.is_empty());
        assert_eq!(options.levels[0], Some(Level { mid: 2, exact: 6, wld: 8 }));
    }

    #[test]
    fn time_and_flags() {
        let options = parse(&args("-time 300 5 300 5 -w 1 -b 0 -komi 2")).unwrap();
        assert!(options.use_timer);
        assert_eq!(options.time, [300.0, 300.0]);
        assert_eq!(options.increment, [5.0, 5.0]);
        assert!(options.wait);
        assert!(!options.use_book);
        assert_eq!(options.komi, 2);
    }

    #[test]
    fn slack_takes_fractions() {
        let options = parse(&args("-slack 1.5 -r 0 -g saved.gam")).unwrap();
        assert_eq!(options.slack, 1.5);
        assert!(!options.random);
        assert_eq!(options.game_file.as_deref(), Some("saved.gam"));
    }

    #[test]
    fn draw_modes() {
        assert_eq!(parse(&args("-keepdraw")).unwrap().draw_mode, DrawMode::Neutral);
        assert_eq!(parse(&args("-draw2black")).unwrap().draw_mode, DrawMode::BlackWins);
        assert_eq!(parse(&args("-draw2white")).unwrap().draw_mode, DrawMode::WhiteWins);
        assert_eq!(parse(&args("-draw2none")).unwrap().draw_mode, DrawMode::OpponentWins);
    }

    #[test]
    fn unknown_option_is_usage_error() {
        assert!(matches!(parse(&args("-frobnicate")), Err(CliError::Usage(_))));
        assert!(matches!(parse(&args("-l 8 16")), Err(CliError::Usage(_))));
        assert!(matches!(parse(&args("-h 0")), Err(CliError::Usage(_))));
    }

    #[test]
    fn tournament_levels() {
        let options = parse(&args("-t 2 4 8 10 6 12 14")).unwrap();
        assert_eq!(options.tournament_levels.len(), 2);
        assert_eq!(options.tournament_levels[1], Level { mid: 6, exact: 12, wld: 14 });
    }

    #[test]
    fn script_mode() {
        let options = parse(&args("-script jobs.pos results.txt -wld 1 -line 1")).unwrap();
        assert_eq!(
            options.script,
            Some(("jobs.pos".to_string(), "results.txt".to_string()))
        );
        assert!(options.wld_only);
        assert!(options.show_opening_line);
    }
}
