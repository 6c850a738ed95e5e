use anyhow::*;
use std::result::Result::Ok;
use bvh_anim::from_bytes;
use log::*;
use mocap::correction::preset;
use mocap::{ArchiveWriter, BvhWriter, Clip, ClipWriter, CorrectionTable, NpzWriter, Options};
use rayon::prelude::*;
use structopt::StructOpt;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

mod bvh;
mod descriptor;

use descriptor::{Config, Format};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "mocap",
    about = "corrects mocap rest poses and bakes kinematic features"
)]
struct Opt {
    /// Defaults for `convert`
    #[structopt(short, long, parse(from_os_str), default_value = "config.toml")]
    config: PathBuf,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Converts every motion file under a directory into `.npz` archives or
    /// corrected `.bvh` files
    Convert(Convert),
    /// Prints a motion file's hierarchy and clip length
    Info {
        #[structopt(parse(from_os_str))]
        file: PathBuf,
    },
}

#[derive(Debug, Default, StructOpt)]
struct Convert {
    #[structopt(parse(from_os_str))]
    source: PathBuf,

    #[structopt(parse(from_os_str))]
    destination: PathBuf,

    /// Extension of the motion files [default: bvh]
    #[structopt(short, long)]
    extension: Option<String>,

    /// Only convert subjects containing this, can be repeated
    #[structopt(short, long = "actor")]
    actors: Vec<String>,

    /// Drop frames down to this rate
    #[structopt(long)]
    fps: Option<u32>,

    /// Source rates must be a multiple of this, 0 skips the check [default: 10]
    #[structopt(long)]
    base_fps: Option<u32>,

    /// Correction table in TOML
    #[structopt(short, long, parse(from_os_str))]
    table: Option<PathBuf>,

    /// Built-in correction table, e.g. `bandai-namco`
    #[structopt(short, long, conflicts_with = "table")]
    preset: Option<String>,

    #[structopt(short, long)]
    jobs: Option<usize>,

    /// `npz` for kinematic features, `bvh` for the corrected clip [default: npz]
    #[structopt(short, long)]
    format: Option<Format>,
}

struct Settings {
    extension: String,
    format: Format,
    actors: Vec<String>,
    options: Options,
    table: Option<CorrectionTable>,
    jobs: Option<usize>,
}

impl Convert {
    fn settings(&self, config: Config) -> Result<Settings> {
        let table = match (
            self.table.clone().or(config.table),
            self.preset.clone().or(config.preset),
        ) {
            (Some(path), _) => {
                let data = fs::read_to_string(&path).with_context(|| {
                    format!("failed to open correction table {}", path.display())
                })?;
                let table = CorrectionTable::from_toml_str(&data)
                    .with_context(|| format!("bad correction table {}", path.display()))?;
                Some(table)
            }
            (None, Some(name)) => {
                let table = preset::by_name(&name).with_context(|| {
                    format!(
                        "unknown preset `{}`, expected one of: {}",
                        name,
                        preset::names().collect::<Vec<_>>().join(", ")
                    )
                })?;
                Some(table.clone())
            }
            (None, None) => {
                warn!("no correction table, rest poses are kept as they are");
                None
            }
        };
        let base_fps = self.base_fps.or(config.base_fps).unwrap_or(10);
        let actors = if self.actors.is_empty() {
            config.actors
        } else {
            self.actors.clone()
        };
        Ok(Settings {
            extension: self
                .extension
                .clone()
                .or(config.extension)
                .unwrap_or_else(|| "bvh".into()),
            actors,
            format: self.format.or(config.format).unwrap_or_default(),
            options: Options {
                base_fps: if base_fps == 0 { None } else { Some(base_fps) },
                target_fps: self.fps.or(config.fps),
            },
            table,
            jobs: self.jobs.or(config.jobs),
        })
    }
}

/// The part of a `<sequence>_<subject>` file stem after the last underscore.
fn subject(path: &Path) -> Option<&str> {
    let stem = path.file_stem()?.to_str()?;
    stem.rfind('_').map(|i| &stem[i + 1..])
}

fn wanted(path: &Path, actors: &[String]) -> bool {
    if actors.is_empty() {
        return true;
    }
    match subject(path) {
        Some(subject) => actors.iter().any(|a| subject.contains(&a[..])),
        None => false,
    }
}

fn discover(source: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let pattern = source.join("**").join(format!("*.{}", extension));
    let mut files: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .context("invalid source directory")?
        .filter_map(|p| p.ok())
        .collect();
    files.sort();
    Ok(files)
}

fn output_path(source: &Path, destination: &Path, file: &Path, format: Format) -> PathBuf {
    let relative = file.strip_prefix(source).unwrap_or(file);
    let extension = match format {
        Format::Npz => NpzWriter.extension(),
        Format::Bvh => BvhWriter.extension(),
    };
    destination.join(relative).with_extension(extension)
}

fn convert_file(file: &Path, output: &Path, settings: &Settings) -> Result<()> {
    ensure!(output != file, "output would overwrite the source file");
    let data = fs::read(file).context("failed to open bvh")?;
    let motion = from_bytes(&data[..]).context("failed to parse bvh")?;
    let buffer = bvh::buffer(&motion);
    let table = settings.table.as_ref();
    if let Some(dir) = output.parent() {
        fs::create_dir_all(dir)?;
    }
    match settings.format {
        Format::Npz => {
            let record = mocap::process(buffer, table, &settings.options)?;
            NpzWriter.write(&record, output)?;
        }
        Format::Bvh => {
            let clip = mocap::correct(buffer, table, &settings.options)?;
            BvhWriter.write(&clip, output)?;
        }
    }
    Ok(())
}

fn convert(args: &Convert, config: Config) -> Result<()> {
    ensure!(
        args.source.is_dir(),
        "source directory {} does not exist",
        args.source.display()
    );
    ensure!(
        args.destination.is_dir(),
        "destination directory {} does not exist",
        args.destination.display()
    );
    let settings = args.settings(config)?;
    if let Some(jobs) = settings.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("failed to set thread count")?;
    }

    let files: Vec<PathBuf> = discover(&args.source, &settings.extension)?
        .into_iter()
        .filter(|file| wanted(file, &settings.actors))
        .collect();
    info!("converting {} files", files.len());

    let failed = AtomicUsize::new(0);
    files.par_iter().for_each(|file| {
        let output = output_path(&args.source, &args.destination, file, settings.format);
        match convert_file(file, &output, &settings) {
            Ok(()) => info!("{} -> {}", file.display(), output.display()),
            Err(e) => {
                failed.fetch_add(1, Ordering::Relaxed);
                error!("{}: {:#}", file.display(), e);
            }
        }
    });

    let failed = failed.into_inner();
    if failed > 0 {
        bail!("{} of {} files failed", failed, files.len());
    }
    info!("done");
    Ok(())
}

fn info(file: &Path) -> Result<()> {
    let data = fs::read(file).context("failed to open bvh")?;
    let motion = from_bytes(&data[..]).context("failed to parse bvh")?;
    let clip = Clip::from_buffer(bvh::buffer(&motion))?;
    let skeleton = clip.skeleton();
    for joint in skeleton.joints() {
        let parent = joint
            .parent
            .map(|p| skeleton.joint(p).name.as_str())
            .unwrap_or("-");
        println!(
            "{:03}: {} <- {} ({}, {}, {})",
            joint.index, joint.name, parent, joint.offset.x, joint.offset.y, joint.offset.z
        );
    }
    println!(
        "{} frames at {} fps, {:.2}s",
        clip.len(),
        clip.fps(),
        clip.len() as f32 * clip.frame_time()
    );
    Ok(())
}

fn load_config(path: &Path) -> Config {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(_) => {
            debug!("no config at {}", path.display());
            return Config::default();
        }
    };
    match toml::from_str(&data) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to parse config file: {}", e);
            Default::default()
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();

    info!("starting up");

    let opt = Opt::from_args();
    match opt.command {
        Command::Convert(ref args) => convert(args, load_config(&opt.config)),
        Command::Info { ref file } => info(file),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bvh::test::WALK;
    use cgmath::InnerSpace;
    use mocap::kinematics;

    const TABLE: &str = r#"
        scale = 0.01

        [[joint]]
        joint = "Hips"
        euler = [0.0, 90.0, 0.0]
        roll = -90.0

        [[joint]]
        joint = "Spine"
        flatten = true

        [keyframe]
        roll = -90.0
    "#;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn actor_filter_matches_subject() {
        let actors = strings(&["subject1"]);
        assert!(wanted(Path::new("walk_subject1.bvh"), &actors));
        assert!(wanted(Path::new("a/run_fast_subject1.bvh"), &actors));
        assert!(!wanted(Path::new("walk_subject2.bvh"), &actors));
        assert!(!wanted(Path::new("subject1.bvh"), &actors));
        assert!(wanted(Path::new("subject1.bvh"), &[]));
    }

    #[test]
    fn outputs_mirror_the_source_tree() {
        let output = output_path(
            Path::new("in"),
            Path::new("out"),
            Path::new("in/day1/walk_subject1.bvh"),
            Format::Npz,
        );
        assert_eq!(output, PathBuf::from("out/day1/walk_subject1.npz"));
        let output = output_path(
            Path::new("in"),
            Path::new("out"),
            Path::new("in/walk_subject1.bvh"),
            Format::Bvh,
        );
        assert_eq!(output, PathBuf::from("out/walk_subject1.bvh"));
    }

    #[test]
    fn flags_override_config() {
        let config = Config {
            actors: strings(&["subject5"]),
            base_fps: Some(30),
            preset: Some("bandai-namco".into()),
            ..Config::default()
        };
        let args = Convert {
            actors: strings(&["subject1"]),
            base_fps: Some(0),
            ..Convert::default()
        };
        let settings = args.settings(config).unwrap();
        assert_eq!(settings.extension, "bvh");
        assert_eq!(settings.format, Format::Npz);
        assert_eq!(settings.actors, strings(&["subject1"]));
        assert_eq!(settings.options.base_fps, None);
        assert_eq!(settings.table.as_ref(), Some(preset::bandai_namco()));

        let args = Convert {
            preset: Some("cmu".into()),
            ..Convert::default()
        };
        assert!(args.settings(Config::default()).is_err());
    }

    #[test]
    fn batch_reports_failures_and_keeps_going() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        fs::write(source.path().join("walk_subject1.bvh"), WALK).unwrap();
        fs::write(source.path().join("broken_subject1.bvh"), "HIERARCHY\n").unwrap();
        fs::write(source.path().join("walk_subject5.bvh"), WALK).unwrap();

        let args = Convert {
            source: source.path().to_path_buf(),
            destination: destination.path().to_path_buf(),
            actors: strings(&["subject1"]),
            ..Convert::default()
        };
        assert!(convert(&args, Config::default()).is_err());
        assert!(destination.path().join("walk_subject1.npz").exists());
        assert!(!destination.path().join("broken_subject1.npz").exists());
        assert!(!destination.path().join("walk_subject5.npz").exists());

        fs::remove_file(source.path().join("broken_subject1.bvh")).unwrap();
        assert!(convert(&args, Config::default()).is_ok());
    }

    #[test]
    fn bvh_output_replays_the_corrected_clip() {
        let source = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        let table = source.path().join("table.toml");
        fs::write(source.path().join("walk_subject1.bvh"), WALK).unwrap();
        fs::write(&table, TABLE).unwrap();

        let args = Convert {
            source: source.path().to_path_buf(),
            destination: destination.path().to_path_buf(),
            table: Some(table),
            format: Some(Format::Bvh),
            ..Convert::default()
        };
        convert(&args, Config::default()).unwrap();
        assert!(!destination.path().join("walk_subject1.npz").exists());

        let written = fs::read(destination.path().join("walk_subject1.bvh")).unwrap();
        let reread = Clip::from_buffer(bvh::buffer(&from_bytes(&written[..]).unwrap())).unwrap();
        let expected = mocap::correct(
            bvh::buffer(&from_bytes(WALK.as_bytes()).unwrap()),
            Some(&CorrectionTable::from_toml_str(TABLE).unwrap()),
            &Options::default(),
        )
        .unwrap();
        assert_eq!(reread.len(), 3);
        assert_eq!(reread.fps(), 30);
        assert_eq!(
            reread.skeleton().names().collect::<Vec<_>>(),
            expected.skeleton().names().collect::<Vec<_>>()
        );

        let replayed = kinematics::evaluate(&reread);
        for (a, b) in replayed.iter().zip(kinematics::evaluate(&expected)) {
            for (x, y) in a.translations.iter().zip(&b.translations) {
                assert!((x - y).magnitude() < 1e-4, "{:?} != {:?}", x, y);
            }
        }
    }

    #[test]
    fn bvh_output_never_overwrites_its_source() {
        let source = tempfile::tempdir().unwrap();
        let file = source.path().join("walk_subject1.bvh");
        fs::write(&file, WALK).unwrap();
        let args = Convert {
            source: source.path().to_path_buf(),
            destination: source.path().to_path_buf(),
            format: Some(Format::Bvh),
            ..Convert::default()
        };
        assert!(convert(&args, Config::default()).is_err());
        assert_eq!(fs::read_to_string(&file).unwrap(), WALK);
    }

    #[test]
    fn missing_directories_are_errors() {
        let existing = tempfile::tempdir().unwrap();
        let args = Convert {
            source: existing.path().join("nope"),
            destination: existing.path().to_path_buf(),
            ..Convert::default()
        };
        assert!(convert(&args, Config::default()).is_err());
    }
}
