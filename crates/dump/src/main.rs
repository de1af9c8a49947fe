use std::{env, fs::File, process};

use joss_stream::{DecodedStream, Options};
use memmap::Mmap;
use regex::Regex;

mod render;

struct Args {
    content: bool,
    classes: bool,
    instances: bool,
    block_data: Option<String>,
    show_arrays: bool,
    filter: Option<Regex>,
    fix_names: bool,
    connect: bool,
    file: String,
}

fn main() {
    pretty_env_logger::init();

    let args = match parse_args(env::args().skip(1)) {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            usage();
            process::exit(2);
        }
    };

    let file = match File::open(&args.file) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("{}: {}", args.file, e);
            process::exit(1);
        }
    };
    let mmap = unsafe { Mmap::map(&file) }.unwrap();

    let options = Options {
        connect_member_classes: args.connect,
    };
    let stream = match DecodedStream::parse(&mmap[..], options) {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("error while decoding {}: {}", args.file, e);
            process::exit(1);
        }
    };
    if stream.top_level().is_empty() {
        log::warn!("{}: stream contains no top-level content", args.file);
    }

    if let Some(path) = &args.block_data {
        if let Err(e) = render::extract_block_data(&stream, path) {
            eprintln!("error while extracting block data: {e}");
            process::exit(1);
        }
    }
    if args.content {
        render::dump_content(&stream);
    }
    if args.classes {
        if let Err(e) =
            render::dump_classes(&stream, args.show_arrays, args.filter.as_ref(), args.fix_names)
        {
            eprintln!("error while printing classes: {e}");
            process::exit(1);
        }
    }
    if args.instances {
        render::dump_instances(&stream);
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args, String> {
    let mut parsed = Args {
        content: false,
        classes: false,
        instances: false,
        block_data: None,
        show_arrays: false,
        filter: None,
        fix_names: false,
        connect: true,
        file: String::new(),
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--content" => parsed.content = true,
            "--classes" => parsed.classes = true,
            "--instances" => parsed.instances = true,
            "--blockdata" => {
                parsed.block_data = Some(
                    args.next()
                        .ok_or("--blockdata requires a file argument")?,
                );
            }
            "--show-arrays" => parsed.show_arrays = true,
            "--filter" => {
                let pattern = args.next().ok_or("--filter requires a pattern argument")?;
                parsed.filter = Some(
                    Regex::new(&pattern).map_err(|e| format!("invalid filter pattern: {e}"))?,
                );
            }
            "--fix-names" => parsed.fix_names = true,
            "--no-connect" => parsed.connect = false,
            _ if arg.starts_with('-') => return Err(format!("unknown option: {arg}")),
            _ => {
                if !parsed.file.is_empty() {
                    return Err("only one input file is supported".to_owned());
                }
                parsed.file = arg;
            }
        }
    }
    if parsed.file.is_empty() {
        return Err("no input file given".to_owned());
    }
    if !(parsed.content || parsed.classes || parsed.instances || parsed.block_data.is_some()) {
        parsed.content = true;
        parsed.classes = true;
        parsed.instances = true;
    }
    Ok(parsed)
}

fn usage() {
    eprintln!(
        "Usage: jossdump [options] <file>

Options:
    --content            print the stream content listing
    --classes            print class declarations
    --instances          print the instance dump
    --blockdata <file>   write block data payloads to <file> plus a manifest
    --show-arrays        include array classes in --classes
    --filter <regex>     exclude classes matching <regex> from --classes
    --fix-names          sanitize illegal identifiers in --classes
    --no-connect         skip the member-class connection pass

With no mode option, all three listings are printed."
    );
}
