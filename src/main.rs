mod decorate;
mod emit;
mod error;
mod event;
mod model;

use crate::error::CellError;
use std::fs;
use std::path::Path;

fn main() -> Result<(), CellError> {
    tracing_subscriber::fmt().with_target(false).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: lspost <cell.json> [out_dir]");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  lspost cell.json programs/");
        std::process::exit(1);
    }

    let input_path = &args[1];
    let out_dir = args.get(2).map(|s| s.as_str()).unwrap_or(".");

    let source = fs::read_to_string(input_path)?;
    let cell: model::Cell = serde_json::from_str(&source)?;

    let files = emit::PostRun::new(&cell).run();
    fs::create_dir_all(out_dir)?;
    for file in &files {
        let path = Path::new(out_dir).join(format!("{}.LS", file.name));
        fs::write(&path, &file.content)?;
        println!("Generated: {}", path.display());
    }

    Ok(())
}
