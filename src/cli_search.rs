use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

use tenor_library::{LibraryStore, SearchService, SqliteLibraryStore};

use rustyline::{
    completion::Completer,
    highlight::Highlighter,
    history::FileHistory,
    validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to an existing library database.
    #[clap(value_parser = parse_path)]
    pub library_db: PathBuf,
}

#[derive(Parser)]
#[command(name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Search artist names.
    Artists { query: Vec<String> },

    /// Search album names.
    Albums { query: Vec<String> },

    /// Search track names.
    Tracks { query: Vec<String> },

    /// Search artists, albums and tracks.
    All { query: Vec<String> },

    /// Show how many rows the library holds.
    Stats,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

const PROMPT: &str = ">> ";

fn print_artists(store: &SqliteLibraryStore, search: &SearchService, query: &str) -> Result<()> {
    let ids = search.search_artists(query);
    println!("Artists ({}):", ids.len());
    for id in ids {
        if let Some(artist) = store.get_artist(&id)? {
            println!("  {}  {}", artist.id, artist.name);
        }
    }
    Ok(())
}

fn print_albums(store: &SqliteLibraryStore, search: &SearchService, query: &str) -> Result<()> {
    let ids = search.search_albums(query);
    println!("Albums ({}):", ids.len());
    for id in ids {
        if let Some(album) = store.get_album(&id)? {
            let artist = store
                .get_artist(&album.artist_id)?
                .map(|a| a.name)
                .unwrap_or_default();
            println!("  {}  {} - {}", album.id, artist, album.name);
        }
    }
    Ok(())
}

fn print_tracks(store: &SqliteLibraryStore, search: &SearchService, query: &str) -> Result<()> {
    let ids = search.search_tracks(query);
    println!("Tracks ({}):", ids.len());
    for id in ids {
        if let Some(track) = store.get_track(&id)? {
            println!(
                "  {}  {:>2}. {} [{}:{:02}]",
                track.id,
                track.position,
                track.name,
                track.duration as u64 / 60,
                track.duration as u64 % 60
            );
        }
    }
    Ok(())
}

fn execute_command(
    line: &str,
    store: &SqliteLibraryStore,
    search: &SearchService,
) -> CommandExecutionResult {
    let line = line.trim();
    if line.is_empty() {
        return CommandExecutionResult::Ok;
    }

    let args: Vec<String> =
        shlex::split(line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());
    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));
    let command = match cli {
        Ok(cli) => cli.command,
        Err(err) => {
            let _ = err.print();
            return CommandExecutionResult::Ok;
        }
    };

    let result = match command {
        InnerCommand::Artists { query } => print_artists(store, search, &query.join(" ")),
        InnerCommand::Albums { query } => print_albums(store, search, &query.join(" ")),
        InnerCommand::Tracks { query } => print_tracks(store, search, &query.join(" ")),
        InnerCommand::All { query } => {
            let query = query.join(" ");
            print_artists(store, search, &query)
                .and_then(|_| print_albums(store, search, &query))
                .and_then(|_| print_tracks(store, search, &query))
        }
        InnerCommand::Stats => {
            println!(
                "{} artists, {} albums, {} tracks, {} images",
                store.get_artists_count(),
                store.get_albums_count(),
                store.get_tracks_count(),
                store.get_images_count()
            );
            Ok(())
        }
        InnerCommand::Exit => return CommandExecutionResult::Exit,
    };

    match result {
        Ok(()) => CommandExecutionResult::Ok,
        Err(err) => CommandExecutionResult::Error(format!("{:#}", err)),
    }
}

#[derive(rustyline_derive::Hinter)]
struct CommandHelper {
    commands_names: Vec<String>,
}

impl CommandHelper {
    fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        CommandHelper { commands_names }
    }

    /// Command names starting with `line`, nothing once arguments begin.
    fn candidates(&self, line: &str) -> Vec<String> {
        if line.contains(' ') {
            return Vec::new();
        }
        self.commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .cloned()
            .collect()
    }
}

impl Completer for CommandHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        Ok((0, self.candidates(line)))
    }
}

impl Highlighter for CommandHelper {}
impl Validator for CommandHelper {}
impl Helper for CommandHelper {}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    if !cli_args.library_db.is_file() {
        bail!("Library database not found: {:?}", cli_args.library_db);
    }

    let store = SqliteLibraryStore::new(&cli_args.library_db)?;
    let search = SearchService::build(&store)?;

    InnerCli::command().print_long_help()?;

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<CommandHelper, FileHistory>::with_config(config)?;
    rl.set_helper(Some(CommandHelper::new()));

    loop {
        match rl.readline(PROMPT) {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(&line, &store, &search) {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => break,
                    CommandExecutionResult::Error(err) => {
                        eprintln!("Error: {}", err);
                        continue;
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                println!("Error: {:?}", e);
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_command_names_only() {
        let helper = CommandHelper::new();
        assert_eq!(helper.candidates("al"), vec!["albums", "all"]);
        assert_eq!(helper.candidates("st"), vec!["stats"]);
        assert!(helper.candidates("artists ra").is_empty());
    }

    #[test]
    fn quoted_queries_and_exit() {
        let store = SqliteLibraryStore::in_memory().unwrap();
        let search = SearchService::build(&store).unwrap();
        assert!(matches!(
            execute_command("tracks \"paranoid android\"", &store, &search),
            CommandExecutionResult::Ok
        ));
        assert!(matches!(
            execute_command("  ", &store, &search),
            CommandExecutionResult::Ok
        ));
        assert!(matches!(
            execute_command("exit", &store, &search),
            CommandExecutionResult::Exit
        ));
    }
}
