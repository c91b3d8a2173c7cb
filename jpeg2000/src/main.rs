use clap::Parser;
use std::error::Error;
use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

use jpeg2000::{decode, Jpeg2000};

#[derive(Debug, Error)]
enum CliError {
    #[error("tile {index} not found")]
    TileMissing { index: u16 },
}

#[derive(Parser)]
struct Opts {
    #[clap(subcommand)]
    subcommand: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    /// Print the structure of a .jp2 container or .jpc codestream file
    Info(Info),

    /// Write the compressed data of one tile to a file
    Extract(Extract),
}

#[derive(Parser)]
struct Info {
    /// Path to .jp2 or .jpc file
    path: String,
}

#[derive(Parser)]
struct Extract {
    /// Path to .jp2 or .jpc file
    path: String,

    /// Index of the tile in raster order
    #[clap(short, long, default_value = "0")]
    tile: u16,

    /// Path of the file to write
    #[clap(short, long)]
    output: String,
}

fn open(path: &str) -> Result<Jpeg2000, Box<dyn Error>> {
    let file = File::open(Path::new(path))?;
    let mut reader = BufReader::new(file);
    Ok(decode(&mut reader)?)
}

fn print_info(image: &Jpeg2000) {
    println!("Format: {}", image.format());
    println!("Size: {}x{}", image.width(), image.height());

    if let Jpeg2000::JP2(jp2) = image {
        let header = jp2.header_box();
        for colr in header.colour_specification_boxes() {
            match colr.enumerated_colour_space() {
                Some(colour_space) => println!("Colour space: {:?}", colour_space),
                None => println!("Colour specification method: {}", colr.method()),
            }
        }
        if let Some(pclr) = header.palette_box() {
            println!(
                "Palette: {} entries, {} columns",
                pclr.num_entries(),
                pclr.num_components()
            );
        }
        for skipped in jp2.skipped_boxes() {
            println!(
                "Skipped box: {:?} ({} bytes)",
                skipped.box_type_name(),
                skipped.box_length()
            );
        }
    }

    let codestream = match image.codestream() {
        Some(codestream) => codestream,
        None => return,
    };

    println!(
        "Components: {} (precision {:?})",
        codestream.no_components(),
        image.precisions()
    );
    for comment in codestream.header().comment_marker_segments() {
        if let Ok(text) = comment.comment_utf8() {
            println!("Comment: {}", text);
        }
    }

    println!("Tiles: {}", codestream.tiles().count());
    for tile in codestream.tiles() {
        println!(
            "  Tile {}: {} tile-parts, {} bytes{}",
            tile.index(),
            tile.parts().len(),
            tile.data_len(),
            if tile.is_complete() { "" } else { " (incomplete)" }
        );
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let opts: Opts = Opts::parse();

    match opts.subcommand {
        SubCommand::Info(c) => {
            let image = open(&c.path)?;
            print_info(&image);
        }
        SubCommand::Extract(c) => {
            let image = open(&c.path)?;
            let tile = image
                .codestream()
                .and_then(|codestream| codestream.tile(c.tile))
                .ok_or(CliError::TileMissing { index: c.tile })?;
            fs::write(&c.output, tile.data())?;
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    match run() {
        Err(e) => Err(e.to_string().into()),
        Ok(_) => Ok(()),
    }
}
