use std::io::{self, BufRead, Write};

use rivescript::{Error, RiveScript, VERSION};

fn main() {
    env_logger::init();

    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let mut bot = RiveScript::new();
    bot.set_debug(config.debug);
    bot.set_utf8(config.utf8);
    bot.set_depth(config.depth);
    bot.set_strict(!config.relaxed);

    if let Err(err) = bot.load_directory(&config.root, &[]) {
        eprintln!("Error loading directory: {err}");
        std::process::exit(1);
    }
    if let Err(err) = bot.sort_replies() {
        eprintln!("Error sorting replies: {err}");
        std::process::exit(1);
    }

    println!(
        "
      .   .
     .:...::      RiveScript Interpreter (Rust)
    .::   ::.     Library Version: v{VERSION}
 ..:;;. ' .;;:..
    .  '''  .     Type '/quit' to quit.
     :;,:,;:      Type '/help' for more options.
     :     :

Using the RiveScript bot found in: {root}
Type a message to the bot and press Return to send it.
",
        root = config.root
    );

    let stdin = io::stdin();
    loop {
        print!("You> ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }

        if let Some(rest) = text.strip_prefix('/') {
            let mut parts = rest.split_whitespace();
            match parts.next().unwrap_or("") {
                "quit" => std::process::exit(0),
                "help" => print_help(),
                "debug" => match parts.next() {
                    Some("on") | None => {
                        bot.set_debug(true);
                        println!("Debug mode is on.");
                    }
                    Some("off") => {
                        bot.set_debug(false);
                        println!("Debug mode is off.");
                    }
                    Some(other) => println!("Unknown /debug option '{other}'."),
                },
                "dump" => match parts.next() {
                    Some("topics") => print!("{}", bot.dump_topics()),
                    Some("sorted") => print!("{}", bot.dump_sorted()),
                    _ => println!("Usage: /dump topics|sorted"),
                },
                other => println!("Unknown command '/{other}'. Try /help."),
            }
            continue;
        }

        match bot.reply("localuser", text) {
            Ok(reply) => println!("Bot> {reply}"),
            Err(err @ Error::NoTriggerMatched) | Err(err @ Error::NoReplyFound) => {
                println!("Bot> [{err}]");
            }
            Err(err) => eprintln!("Error: {err}"),
        }
    }
}

struct CliConfig {
    root: String,
    debug: bool,
    utf8: bool,
    relaxed: bool,
    depth: usize,
}

fn parse_args() -> Result<CliConfig, String> {
    let mut root: Option<String> = None;
    let mut debug = false;
    let mut utf8 = false;
    let mut relaxed = false;
    let mut depth = 50usize;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{}", help_text());
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("rivescript {VERSION}");
                std::process::exit(0);
            }
            "--debug" => debug = true,
            "--utf8" => utf8 = true,
            "--nostrict" => relaxed = true,
            "--depth" => {
                let value = args
                    .next()
                    .ok_or_else(|| "error: --depth expects a value".to_string())?;
                depth = value
                    .parse()
                    .map_err(|_| format!("error: invalid --depth '{value}'"))?;
            }
            _ if arg.starts_with("--depth=") => {
                let value = arg.trim_start_matches("--depth=");
                depth = value
                    .parse()
                    .map_err(|_| format!("error: invalid --depth '{value}'"))?;
            }
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                if root.is_some() {
                    return Err("error: only one directory may be given".to_string());
                }
                root = Some(arg);
            }
        }
    }

    let root = root.ok_or_else(|| format!("Usage: rivescript [options] </path/to/documents>\n\n{}", help_text()))?;

    Ok(CliConfig {
        root,
        debug,
        utf8,
        relaxed,
        depth,
    })
}

fn print_help() {
    println!(
        "Supported commands:
- /help            : Show this text.
- /quit            : Exit the program.
- /debug [on|off]  : Toggle debug mode.
- /dump topics     : Dump the topic structure.
- /dump sorted     : Dump the sorted trigger indices."
    );
}

fn help_text() -> String {
    format!(
        "rivescript {VERSION}

RiveScript interpreter REPL.

Usage:
  rivescript [OPTIONS] <directory>

Options:
  --debug            Enable debug mode.
  --utf8             Enable UTF-8 support within RiveScript.
  --depth <n>        Recursion depth limit (default 50).
  --nostrict         Downgrade syntax errors to warnings.
  -h, --help         Show this help message.
  -V, --version      Print version information.

Exit codes:
  0  Success.
  1  Failed to load or sort the brain.
  2  Invalid arguments.
"
    )
}
