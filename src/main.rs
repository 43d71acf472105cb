//! relstore - inspect a media library from the command line.

use std::path::PathBuf;
use std::process::ExitCode;

use relstore::library::{LibraryConfig, MediaLibrary};
use tracing_subscriber::EnvFilter;

enum Command {
    Stats,
    Movies,
    Performers,
    Cast(u64),
    Copy(PathBuf),
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Parse simple command line args.
    let mut home = PathBuf::from(".relstore");
    let mut verbose = false;
    let mut create = false;
    let mut words: Vec<String> = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-d" | "--home" => {
                i += 1;
                if i < args.len() {
                    home = PathBuf::from(&args[i]);
                }
            }
            "-v" | "--verbose" => {
                verbose = true;
            }
            "-c" | "--create" => {
                create = true;
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("relstore v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown option: {}", arg);
                return ExitCode::FAILURE;
            }
            arg => words.push(arg.to_string()),
        }
        i += 1;
    }

    init_tracing(verbose);

    let command = match parse_command(&words) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("{}", message);
            print_help();
            return ExitCode::FAILURE;
        }
    };

    let config = LibraryConfig::new(&home).create_if_missing(create);
    let library = match MediaLibrary::open(config) {
        Ok(library) => library,
        Err(e) => {
            eprintln!("Error opening library: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&library, command) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "relstore=debug" } else { "relstore=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_command(words: &[String]) -> Result<Command, String> {
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    match words.as_slice() {
        [] | ["stats"] => Ok(Command::Stats),
        ["movies"] => Ok(Command::Movies),
        ["performers"] => Ok(Command::Performers),
        ["cast", id] => id
            .parse()
            .map(Command::Cast)
            .map_err(|_| format!("Invalid movie id: {}", id)),
        ["copy", dest] => Ok(Command::Copy(PathBuf::from(dest))),
        other => Err(format!("Unknown command: {}", other.join(" "))),
    }
}

fn run(library: &MediaLibrary, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Stats => {
            println!("{}", library.home().display());
            println!("{}", library.stats());
        }
        Command::Movies => {
            for movie in library.movies().all() {
                let movie = movie.read();
                let image = if movie.image.is_some() { "\t[image]" } else { "" };
                println!("{}\t{}\t{}{}", movie.id, movie.year, movie.title, image);
            }
        }
        Command::Performers => {
            for performer in library.performers().all() {
                let performer = performer.read();
                println!("{}\t{}", performer.id, performer.name);
            }
        }
        Command::Cast(id) => {
            let movie = library
                .movies()
                .get(id)
                .ok_or_else(|| format!("No movie with id {}", id))?;
            println!("{}", movie.read().title);
            for performer in library.cast_of(&movie).unwrap_or_default() {
                let performer = performer.read();
                println!("  {}\t{}", performer.id, performer.name);
            }
        }
        Command::Copy(dest) => {
            let copy = library.copy_to(&dest)?;
            println!("Copied to {} ({})", copy.home().display(), copy.stats());
        }
    }
    Ok(())
}

fn print_help() {
    println!("relstore - file-backed movie and performer library");
    println!();
    println!("Usage: relstore [OPTIONS] [COMMAND]");
    println!();
    println!("Options:");
    println!("  -d, --home PATH    Library home directory (default: .relstore)");
    println!("  -c, --create       Create the library if it does not exist");
    println!("  -v, --verbose      Enable debug logging");
    println!("  -h, --help         Show this help message");
    println!("  --version          Show version");
    println!();
    println!("Commands:");
    println!("  stats              Count movies, performers and links (default)");
    println!("  movies             List movies");
    println!("  performers         List performers");
    println!("  cast ID            List the cast of a movie");
    println!("  copy DEST          Copy the library to an empty directory");
}
