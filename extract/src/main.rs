use dot;
use failure::{format_err, Error, ResultExt};
use image::ImageFormat;
use regex::Regex;
use serde::Serialize;
use std::borrow::Cow;
use std::fs::{self, File};
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::process;
use structopt::StructOpt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use prince_of_persia::{
    decode_level, decode_sprite_sheet, ContentKey, DecodeCache, Decoded, Direction, Level,
    SpriteSheet, SpriteSheetConfig, TileKind, TileType, UnknownValue,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "extract", about = "Decode Prince of Persia level and sprite files")]
enum Opt {
    /// Decode level blueprints.
    Level {
        #[structopt(parse(from_os_str), required = true)]
        files: Vec<PathBuf>,

        /// Write one JSON file per level into this directory.
        #[structopt(long, parse(from_os_str))]
        json_dir: Option<PathBuf>,

        /// Write a Graphviz graph of room adjacency.
        #[structopt(long, parse(from_os_str))]
        dot: Option<PathBuf>,
    },

    /// Decode sprite containers.
    Sprites {
        /// Files or directories to search.
        #[structopt(parse(from_os_str), required = true)]
        paths: Vec<PathBuf>,

        /// Address the containers were assembled to.
        #[structopt(long, default_value = "0x6000", parse(try_from_str = parse_int::parse))]
        base: u16,

        /// File offset of the pointer table.
        #[structopt(long, default_value = "1", parse(try_from_str = parse_int::parse))]
        table_offset: usize,

        /// Only files in walked directories whose name matches are decoded.
        #[structopt(long, default_value = r"^IMG\.CHTAB")]
        pattern: Regex,

        /// Write one JSON file per container into this directory.
        #[structopt(long, parse(from_os_str))]
        json_dir: Option<PathBuf>,

        /// Write every sprite as a PNG into this directory.
        #[structopt(long, parse(from_os_str))]
        png_dir: Option<PathBuf>,
    },
}

type Nd = (usize, u8);
type Ed = (Nd, Nd, Direction);

struct Edges {
    names: Vec<String>,
    edges: Vec<Ed>,
}

impl<'a> dot::Labeller<'a, Nd, Ed> for Edges {
    fn graph_id(&'a self) -> dot::Id<'a> {
        dot::Id::new("PrinceOfPersia").unwrap()
    }

    fn node_id(&'a self, n: &Nd) -> dot::Id<'a> {
        dot::Id::new(format!("level{}_room{}", n.0, n.1)).unwrap()
    }

    fn node_label(&'a self, n: &Nd) -> dot::LabelText<'a> {
        dot::LabelText::LabelStr(format!("{} room {}", self.names[n.0], n.1).into())
    }

    fn edge_label(&'a self, e: &Ed) -> dot::LabelText<'a> {
        dot::LabelText::LabelStr(e.2.to_string().into())
    }
}

impl<'a> dot::GraphWalk<'a, Nd, Ed> for Edges {
    fn nodes(&self) -> dot::Nodes<'a, Nd> {
        let mut nodes = Vec::with_capacity(self.edges.len());
        for &(s, t, _) in &self.edges {
            nodes.push(s);
            nodes.push(t);
        }
        nodes.sort();
        nodes.dedup();
        Cow::Owned(nodes)
    }

    fn edges(&'a self) -> dot::Edges<'a, Ed> {
        Cow::Borrowed(&self.edges[..])
    }

    fn source(&self, e: &Ed) -> Nd {
        e.0
    }

    fn target(&self, e: &Ed) -> Nd {
        e.1
    }
}

impl Edges {
    fn add_level(&mut self, name: String, level: &Level) {
        let index = self.names.len();
        self.names.push(name);
        for link in level.graph().links() {
            if let Some(target) = link.target {
                self.edges
                    .push(((index, link.room), (index, target), link.direction));
            }
        }
    }
}

#[derive(Serialize)]
struct LevelExport<'a> {
    file: String,
    sha256: String,
    level: &'a Level,
    warnings: &'a [UnknownValue],
}

#[derive(Serialize)]
struct SpriteExport<'a> {
    file: String,
    sha256: String,
    sheet: &'a SpriteSheet,
}

fn read_file(path: &Path) -> Result<Vec<u8>, Error> {
    let mut f = File::open(path).with_context(|_| format!("opening {}", path.display()))?;
    let mut buffer = Vec::new();
    f.read_to_end(&mut buffer)
        .with_context(|_| format!("reading {}", path.display()))?;
    Ok(buffer)
}

fn file_stem(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn write_json<T: Serialize>(dir: &Path, stem: &str, value: &T) -> Result<(), Error> {
    fs::create_dir_all(dir).with_context(|_| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{}.json", stem));
    let f = File::create(&path).with_context(|_| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(f, value)
        .with_context(|_| format!("writing {}", path.display()))?;
    Ok(())
}

fn summarize_level(name: &str, decoded: &Decoded<Level>) {
    let level = &decoded.value;
    let info = level.info();
    let unknown = level
        .tile_histogram()
        .iter()
        .filter(|(kind, _)| match kind {
            TileKind::Unknown(_) => true,
            TileKind::Known(_) => false,
        })
        .map(|(_, n)| n)
        .sum::<usize>();

    info!(
        "{}: start room {} block {}, {} active guards, {} spikes, {} gates, {} potions, {} unknown tiles",
        name,
        info.start.room,
        info.start.block,
        info.active_guards().count(),
        level.count(TileType::Spike),
        level.count(TileType::Gate),
        level.count(TileType::Potion),
        unknown,
    );
    for warning in &decoded.warnings {
        warn!("{}: {}", name, warning);
    }
}

fn extract_levels(
    files: &[PathBuf],
    json_dir: Option<&Path>,
    dot_path: Option<&Path>,
) -> usize {
    let mut cache = DecodeCache::new();
    let mut edges = Edges {
        names: Vec::new(),
        edges: Vec::new(),
    };
    let mut failures = 0;

    for path in files {
        let name = file_stem(path);
        let result = read_file(path).and_then(|data| {
            let decoded = cache.get_or_decode(&data, |d| decode_level(d))?;
            summarize_level(&name, &decoded);
            edges.add_level(name.clone(), &decoded.value);

            if let Some(dir) = json_dir {
                let export = LevelExport {
                    file: path.display().to_string(),
                    sha256: ContentKey::of(&data).to_string(),
                    level: &decoded.value,
                    warnings: &decoded.warnings,
                };
                write_json(dir, &name, &export)?;
            }
            Ok(())
        });

        if let Err(e) = result {
            error!("{}: {}", path.display(), e);
            failures += 1;
        }
    }

    if let Some(path) = dot_path {
        let result = File::create(path)
            .map_err(Error::from)
            .and_then(|mut f| Ok(dot::render(&edges, &mut f)?));
        match result {
            Ok(()) => info!("wrote room graph to {}", path.display()),
            Err(e) => {
                error!("{}: {}", path.display(), e);
                failures += 1;
            }
        }
    }

    failures
}

// Directories are searched recursively and filtered by `pattern`.  Files
// named on the command line are always decoded.
fn sprite_files(paths: &[PathBuf], pattern: &Regex) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }
        for entry in WalkDir::new(path)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            if pattern.is_match(&entry.file_name().to_string_lossy()) {
                files.push(entry.into_path());
            }
        }
    }
    files
}

fn dump_sprites(dir: &Path, stem: &str, sheet: &SpriteSheet) -> Result<usize, Error> {
    fs::create_dir_all(dir).with_context(|_| format!("creating {}", dir.display()))?;
    let mut written = 0;
    for (i, image) in sheet.images().enumerate() {
        let bitmap = match image.bitmap() {
            Some(bitmap) => bitmap,
            None => continue,
        };
        let path = dir.join(format!("{}_{:03}.png", stem, i));
        bitmap
            .render()
            .save_with_format(&path, ImageFormat::PNG)
            .with_context(|_| format!("writing {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

fn extract_sprites(
    paths: &[PathBuf],
    config: &SpriteSheetConfig,
    pattern: &Regex,
    json_dir: Option<&Path>,
    png_dir: Option<&Path>,
) -> usize {
    let files = sprite_files(paths, pattern);
    if files.is_empty() {
        warn!("no sprite containers matched {}", pattern);
    }

    let mut cache = DecodeCache::new();
    let mut failures = 0;
    for path in &files {
        let name = file_stem(path);
        let result = read_file(path).and_then(|data| {
            let sheet = cache.get_or_decode(&data, |d| decode_sprite_sheet(d, config))?;
            let empty = sheet.images().filter(|i| i.is_empty()).count();
            info!(
                "{}: {} sprites ({} empty)",
                name,
                sheet.len(),
                empty
            );

            if let Some(dir) = json_dir {
                let export = SpriteExport {
                    file: path.display().to_string(),
                    sha256: ContentKey::of(&data).to_string(),
                    sheet: &sheet,
                };
                write_json(dir, &name, &export)?;
            }
            if let Some(dir) = png_dir {
                let written = dump_sprites(dir, &name, &sheet)?;
                info!("{}: wrote {} images to {}", name, written, dir.display());
            }
            Ok(())
        });

        if let Err(e) = result {
            error!("{}: {}", path.display(), e);
            failures += 1;
        }
    }

    failures
}

fn run(opt: Opt) -> Result<(), Error> {
    let failures = match opt {
        Opt::Level {
            files,
            json_dir,
            dot,
        } => extract_levels(&files, json_dir.as_deref(), dot.as_deref()),
        Opt::Sprites {
            paths,
            base,
            table_offset,
            pattern,
            json_dir,
            png_dir,
        } => {
            let config = SpriteSheetConfig {
                base_address: base,
                table_offset,
            };
            extract_sprites(
                &paths,
                &config,
                &pattern,
                json_dir.as_deref(),
                png_dir.as_deref(),
            )
        }
    };

    if failures > 0 {
        return Err(format_err!("{} file(s) failed to decode", failures));
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Opt::from_args()) {
        error!("{}", e);
        process::exit(1);
    }
}
