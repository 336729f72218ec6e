use std::borrow::Cow::{self, Borrowed, Owned};
use std::error::Error;
use std::time::Duration;

use clap::Parser;
use log::warn;
use pump_console::session::Session;
use pump_console::virtual_pump::VIRTUAL_PORT;
use pump_console::{describe_ports, ConsoleError, PUMP_PROBE};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::HistoryHinter;
use rustyline::{Cmd, CompletionType, Config, EditMode, Editor, KeyEvent};
use rustyline_derive::{Completer, Helper, Hinter, Validator};

const HELP: &str = "\
g                   status of every channel
p                   board and motor counts
a | aBM             stop all | stop board B motor M
sBMDDD              set duty DDD (000-255)
rBMdSSSSS           run direction d (0/f, 1/b) for SSSSS seconds
pumps               connected pumps, * marks the selected one
connect <target>    connect a port name, a usb vid:pid or 'virtual'
disconnect [name]   drop the named or the selected pump
use <name>          send commands to another pump
quit                leave";

#[derive(Helper, Completer, Hinter, Validator)]
struct ConsoleHelper {
    #[rustyline(Hinter)]
    hinter: HistoryHinter,
    colored_prompt: String,
}

impl Highlighter for ConsoleHelper {
    fn highlight_prompt<'b, 's: 'b, 'p: 'b>(&'s self, prompt: &'p str, default: bool) -> Cow<'b, str> {
        if default {
            Borrowed(&self.colored_prompt)
        } else {
            Borrowed(prompt)
        }
    }

    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Owned("\x1b[1m".to_owned() + hint + "\x1b[m")
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "Command console for the pump controller", long_about = None)]
#[command(next_line_help = true)]
struct Cli {
    /// Serial port name, e.g. /dev/ttyACM0. May be repeated
    #[arg(long)]
    port: Vec<String>,

    /// USB vid:pid to look for when no port is given
    #[arg(long, default_value = PUMP_PROBE)]
    probe: String,

    /// Connect a pump simulated in this process
    #[arg(long = "virtual", default_value_t = false)]
    virtual_pump: bool,

    /// Print the available serial ports and exit
    #[arg(long, default_value_t = false)]
    list: bool,

    #[arg(long, default_value_t = 115_200)]
    baud: u32,

    /// Seconds to wait for a reply
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    #[arg(long, default_value = "pump_history.txt")]
    history: String,
}

fn list_pumps(session: &Session) -> String {
    let lines: Vec<String> = session
        .pumps()
        .map(|(name, kind)| {
            let mark = if session.active() == Some(name) { '*' } else { ' ' };
            format!("{mark} {name} ({kind})")
        })
        .collect();
    if lines.is_empty() {
        "no pumps connected".to_owned()
    } else {
        lines.join("\n")
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.list {
        for port in describe_ports() {
            println!("{port}");
        }
        return Ok(());
    }

    let mut session = Session::new(cli.baud, Duration::from_secs(cli.timeout));
    let mut targets = cli.port.clone();
    if cli.virtual_pump {
        targets.push(VIRTUAL_PORT.to_owned());
    }
    if targets.is_empty() {
        targets.push(cli.probe.clone());
    }
    for target in &targets {
        match session.connect(target) {
            Ok(name) => println!("connected to {name}"),
            Err(e) => {
                warn!("{}", e);
                println!("{e}");
            }
        }
    }
    println!("'help' lists commands");

    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(ConsoleHelper { hinter: HistoryHinter::new(), colored_prompt: String::new() }));
    rl.bind_sequence(KeyEvent::alt('n'), Cmd::HistorySearchForward);
    rl.bind_sequence(KeyEvent::alt('p'), Cmd::HistorySearchBackward);
    if rl.load_history(&cli.history).is_err() {
        println!("No previous history.");
    }

    let mut count = 1;
    loop {
        let prompt = format!("{count}> ");
        if let Some(helper) = rl.helper_mut() {
            helper.colored_prompt = format!("\x1b[1;32m{prompt}\x1b[0m");
        }
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line)?;
                let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
                let rest = rest.trim();
                let outcome = match word {
                    "quit" | "exit" => break,
                    "help" => Ok(HELP.to_owned()),
                    "pumps" => Ok(list_pumps(&session)),
                    "connect" if !rest.is_empty() => session.connect(rest).map(|name| format!("connected to {name}")),
                    "disconnect" => session
                        .disconnect(Some(rest).filter(|r| !r.is_empty()))
                        .map(|name| format!("disconnected from {name}")),
                    "use" if !rest.is_empty() => session.select(rest).map(|_| format!("sending to {rest}")),
                    _ => session.send(line),
                };
                match outcome {
                    Ok(text) => println!("{text}"),
                    Err(e @ ConsoleError::Rejected(_)) => println!("{e}"),
                    Err(e) => {
                        warn!("{}", e);
                        println!("{e}");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
        count += 1;
    }
    rl.append_history(&cli.history)?;
    Ok(())
}
