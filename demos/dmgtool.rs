//! Disk image command-line tool
//!
//! A read-only utility for inspecting Apple Disk Images (DMG files, aka UDIF).
//!
//! # Usage
//!
//! ```text
//! dmgtool info <dmg-file>                     Show trailer and block-map information
//! dmgtool list <dmg-file>                     List blocks and their chunk counts
//! dmgtool read <dmg-file> <lba> <count> <out> Read sectors [lba, lba+count) to a file
//! dmgtool check <file>                        Check if a file looks like a disk image
//! ```

use std::env;
use std::fs;
use std::fs::File;
use std::process;

use apple_disk_image::{ChunkType, OwnedDiskImage, Result};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "info" => cmd_info(&args[2..]),
        "list" => cmd_list(&args[2..]),
        "read" => cmd_read(&args[2..]),
        "check" => cmd_check(&args[2..]),
        "-h" | "--help" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn print_usage() {
    eprintln!(
        r#"dmgtool - read-only Apple Disk Image utility

USAGE:
    dmgtool <COMMAND> [OPTIONS]

COMMANDS:
    info <dmg-file>                        Show trailer and block-map information
    list <dmg-file>                        List blocks and their chunk counts
    read <dmg-file> <lba> <count> <out>    Read sectors [lba, lba+count) to a file
    check <file>                           Check if a file looks like a disk image

OPTIONS:
    -h, --help    Print help information

EXAMPLES:
    dmgtool info image.dmg
    dmgtool list image.dmg
    dmgtool read image.dmg 0 16 first-8k.raw
"#
    );
}

fn open(path: &str) -> Result<OwnedDiskImage> {
    let file = File::open(path)?;
    OwnedDiskImage::from_reader(file)
}

fn cmd_info(args: &[String]) -> Result<()> {
    if args.is_empty() {
        eprintln!("Usage: dmgtool info <dmg-file>");
        process::exit(1);
    }

    let path = &args[0];
    let image = open(path)?;

    let mut zero = 0;
    let mut ignore = 0;
    let mut raw = 0;
    let mut zlib = 0;
    let mut other = 0;
    for block in image.blocks() {
        for chunk in &block.chunks {
            match chunk.chunk_type {
                ChunkType::Zero => zero += 1,
                ChunkType::Ignore => ignore += 1,
                ChunkType::Raw => raw += 1,
                ChunkType::Zlib => zlib += 1,
                ChunkType::Terminator => {}
                ChunkType::Other(_) => other += 1,
            }
        }
    }

    println!("Disk image: {}", path);
    println!("{}", "=".repeat(60));
    println!("Sector count:  {}", image.sector_count());
    println!("Blocks:        {}", image.blocks().len());
    println!();
    println!("Chunk types:");
    println!("  Zero:        {}", zero);
    println!("  Ignore:      {}", ignore);
    println!("  Raw:         {}", raw);
    println!("  Zlib:        {}", zlib);
    if other > 0 {
        println!("  Unsupported: {}", other);
    }

    Ok(())
}

fn cmd_list(args: &[String]) -> Result<()> {
    if args.is_empty() {
        eprintln!("Usage: dmgtool list <dmg-file>");
        process::exit(1);
    }

    let path = &args[0];
    let image = open(path)?;

    println!("Blocks in {}:", path);
    println!("{}", "=".repeat(70));
    println!(
        "{:>6}  {:>12}  {:>12}  {:>8}  Name",
        "ID", "First sector", "Sectors", "Chunks"
    );
    println!("{}", "-".repeat(70));

    for block in image.blocks() {
        println!(
            "{:>6}  {:>12}  {:>12}  {:>8}  {}",
            block.id,
            block.first_sector,
            block.sector_count,
            block.chunks.len(),
            block.name
        );
    }

    Ok(())
}

fn cmd_read(args: &[String]) -> Result<()> {
    if args.len() < 4 {
        eprintln!("Usage: dmgtool read <dmg-file> <lba> <count> <output-file>");
        process::exit(1);
    }

    let dmg_path = &args[0];
    let lba: u64 = args[1].parse().unwrap_or_else(|_| {
        eprintln!("lba must be a non-negative integer");
        process::exit(1);
    });
    let count: u64 = args[2].parse().unwrap_or_else(|_| {
        eprintln!("count must be a non-negative integer");
        process::exit(1);
    });
    let output_path = &args[3];

    let image = open(dmg_path)?;

    let mut buf = vec![0u8; (count * 512) as usize];
    image.read(lba, &mut buf)?;

    fs::write(output_path, &buf)?;
    println!("Wrote {} bytes to {}", buf.len(), output_path);

    Ok(())
}

fn cmd_check(args: &[String]) -> Result<()> {
    if args.is_empty() {
        eprintln!("Usage: dmgtool check <file>");
        process::exit(1);
    }

    let path = &args[0];

    match open(path) {
        Ok(_) => println!("{} looks like a valid disk image", path),
        Err(e) => {
            println!("{} is NOT a valid disk image: {}", path, e);
            process::exit(1);
        }
    }

    Ok(())
}
