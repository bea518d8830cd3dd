// stage-compiler - Game Script Compiler
// Compiles a game script into a project specification, an IR document and a JavaScript module

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use stagehand::stage_compiler::{CompilerConfig, StageCompiler};

fn main() {
    // Initialize logging
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    let mut input_file = "";
    let mut output_dir: Option<PathBuf> = None;
    let mut config_file: Option<&str> = None;
    let mut strict = false;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-o" | "--output" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: -o requires a directory");
                    process::exit(1);
                }
                output_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--config" => {
                if i + 1 >= args.len() {
                    eprintln!("Error: --config requires a filename");
                    process::exit(1);
                }
                config_file = Some(args[i + 1].as_str());
                i += 2;
            }
            "--strict" => {
                strict = true;
                i += 1;
            }
            "-v" | "--verbose" => {
                verbose = true;
                i += 1;
            }
            "-h" | "--help" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            arg if arg.starts_with('-') => {
                eprintln!("Error: Unknown option '{}'", arg);
                print_usage(&args[0]);
                process::exit(1);
            }
            _ => {
                if input_file.is_empty() {
                    input_file = &args[i];
                } else {
                    eprintln!("Error: Multiple input files specified");
                    process::exit(1);
                }
                i += 1;
            }
        }
    }

    if input_file.is_empty() {
        eprintln!("Error: No input file specified");
        print_usage(&args[0]);
        process::exit(1);
    }

    let mut config = match config_file {
        Some(path) => CompilerConfig::load(Path::new(path)).unwrap_or_else(|err| {
            eprintln!("Error: {}", err);
            process::exit(1);
        }),
        None => CompilerConfig::default(),
    };
    if strict {
        config.strict_blocks = true;
    }

    let input_path = Path::new(input_file);
    let stem = input_path.file_stem().unwrap_or_else(|| {
        eprintln!("Error: Invalid input filename");
        process::exit(1);
    });
    let stem = stem.to_string_lossy().into_owned();
    let output_dir = output_dir.unwrap_or_else(|| {
        input_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    if verbose {
        println!("Compiling {} -> {}/{}.*", input_file, output_dir.display(), stem);
    }

    // Read source file
    let source = match fs::read_to_string(input_file) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("Error reading '{}': {}", input_file, err);
            process::exit(1);
        }
    };

    // Compile
    let compiler = StageCompiler::with_config(config);
    let compiled = match compiler.compile_source(&source, Some(input_path)) {
        Ok(compiled) => compiled,
        Err(err) => {
            eprintln!("{}", err.render(&source, Some(input_file)));
            process::exit(1);
        }
    };

    for warning in &compiled.warnings {
        eprintln!("{}", warning.render(&source, Some(input_file)));
    }

    let outputs = [
        (format!("{}.project.json", stem), compiled.project_json()),
        (format!("{}.ir.json", stem), compiled.ir_json()),
        (format!("{}.js", stem), Ok(compiled.target_source.clone())),
    ];

    if let Err(err) = fs::create_dir_all(&output_dir) {
        eprintln!("Error creating '{}': {}", output_dir.display(), err);
        process::exit(1);
    }
    for (name, text) in outputs {
        let text = text.unwrap_or_else(|err| {
            eprintln!("Error: {}", err);
            process::exit(1);
        });
        let path = output_dir.join(&name);
        if let Err(err) = fs::write(&path, text) {
            eprintln!("Error writing '{}': {}", path.display(), err);
            process::exit(1);
        }
        if verbose {
            println!("Wrote {}", path.display());
        }
    }

    if verbose {
        println!(
            "Compiled {} actions, {} predicates, {} helpers ({} warning(s))",
            compiled.project.actions.len(),
            compiled.project.predicates.len(),
            compiled.project.callables.len(),
            compiled.warnings.len()
        );
    }
}

fn print_usage(program_name: &str) {
    println!("Usage: {} [options] <game.py>", program_name);
    println!();
    println!("Options:");
    println!("  -o, --output <dir>     Output directory (default: next to the input)");
    println!("  --config <file.toml>   Compiler configuration");
    println!("  --strict               Drop top-level statements outside code blocks");
    println!("  -v, --verbose          Verbose output");
    println!("  -h, --help             Show this help message");
    println!();
    println!("Outputs:");
    println!("  <stem>.project.json    Project specification");
    println!("  <stem>.ir.json         Function IR");
    println!("  <stem>.js              Generated ES module");
    println!();
    println!("Examples:");
    println!("  {} demos/coins.py", program_name);
    println!("  {} -o build --strict demos/duel.py", program_name);
}
