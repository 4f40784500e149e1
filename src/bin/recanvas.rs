use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use recanvas::{
    BlockUtil, FrameRGBA, GlitchParams, ReCanvas, ReCanvasOpts, SpriteId, Stage, StageEffects,
    StageOpts, WaveParams,
};

#[derive(Parser, Debug)]
#[command(name = "recanvas", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print block metadata as JSON.
    Blocks {
        /// Print the stage effects extension instead of the canvas extension.
        #[arg(long)]
        effects: bool,
    },
    /// Run a JSON script of block calls on a headless stage and write the stage as PNG.
    Run(RunArgs),
    /// Apply a stage effect to a PNG.
    Fx(FxArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Script JSON.
    #[arg(long)]
    script: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Frames to draw after the script finishes.
    #[arg(long, default_value_t = 1)]
    frames: u32,

    /// Font files for text blocks.
    #[arg(long)]
    font: Vec<PathBuf>,
}

#[derive(Parser, Debug)]
struct FxArgs {
    #[arg(long = "in")]
    in_path: PathBuf,

    #[arg(long)]
    out: PathBuf,

    #[command(subcommand)]
    effect: Effect,
}

#[derive(Subcommand, Debug)]
enum Effect {
    Wave {
        #[arg(long, default_value_t = 10.0)]
        strength: f64,
        #[arg(long, default_value_t = 0.05)]
        frequency: f64,
        #[arg(long, default_value_t = 0.1)]
        speed: f64,
        /// Frame counter value to render.
        #[arg(long, default_value_t = 0)]
        frame: u64,
    },
    Split {
        #[arg(long, default_value_t = 5)]
        strength: i64,
    },
    Glitch {
        #[arg(long, default_value_t = 8)]
        frequency: u32,
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[derive(Deserialize, Debug)]
struct Script {
    #[serde(default)]
    stage: StageOpts,
    #[serde(default)]
    opts: ReCanvasOpts,
    #[serde(default = "one")]
    sprites: u32,
    steps: Vec<Step>,
}

fn one() -> u32 {
    1
}

#[derive(Deserialize, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Step {
    /// Canvas block on the sprite with this index.
    Block {
        #[serde(default)]
        sprite: usize,
        opcode: String,
        #[serde(default)]
        args: Map<String, Value>,
    },
    /// Stage effects block.
    Effect {
        opcode: String,
        #[serde(default)]
        args: Map<String, Value>,
    },
    Position {
        #[serde(default)]
        sprite: usize,
        x: f64,
        y: f64,
    },
    Frame {
        #[serde(default = "one")]
        count: u32,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Blocks { effects } => cmd_blocks(effects),
        Command::Run(args) => cmd_run(args),
        Command::Fx(args) => cmd_fx(args),
    }
}

fn cmd_blocks(effects: bool) -> anyhow::Result<()> {
    let info = if effects {
        recanvas::effects_info()
    } else {
        recanvas::recanvas_info()
    };
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn read_script(path: &Path) -> anyhow::Result<Script> {
    let f = File::open(path).with_context(|| format!("open script '{}'", path.display()))?;
    serde_json::from_reader(BufReader::new(f)).with_context(|| "parse script JSON")
}

struct Runner {
    stage: Stage,
    canvas: ReCanvas,
    effects: StageEffects,
    sprites: Vec<SpriteId>,
}

impl Runner {
    fn frame(&mut self) -> anyhow::Result<()> {
        for &sprite in &self.sprites {
            self.canvas.wait_for_images(sprite);
        }
        self.canvas.sync_with_stage(&mut self.stage, Instant::now());
        self.stage.draw();
        self.effects.run_due_frames(&mut self.stage)?;
        Ok(())
    }

    fn sprite(&self, index: usize) -> anyhow::Result<SpriteId> {
        self.sprites
            .get(index)
            .copied()
            .with_context(|| format!("script has no sprite #{index}"))
    }
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let script = read_script(&args.script)?;
    let mut stage = Stage::new(script.stage.clone());
    let sprites = (0..script.sprites.max(1)).map(|_| stage.add_sprite()).collect();
    let mut canvas = ReCanvas::new(script.opts.clone().with_env_overrides());
    canvas.install(stage.hooks_mut());
    for path in &args.font {
        let bytes = std::fs::read(path).with_context(|| format!("read font '{}'", path.display()))?;
        let family = canvas.register_font(bytes)?;
        eprintln!("font: {family} ({})", path.display());
    }

    let mut runner = Runner {
        stage,
        canvas,
        effects: StageEffects::new(),
        sprites,
    };

    for (i, step) in script.steps.into_iter().enumerate() {
        match step {
            Step::Block {
                sprite,
                opcode,
                args,
            } => {
                let target = runner.sprite(sprite)?;
                let mut util = BlockUtil::new(target, &mut runner.stage);
                let value = runner
                    .canvas
                    .call(&mut util, &opcode, &args)
                    .with_context(|| format!("step {i}: {opcode}"))?;
                if let Some(value) = value {
                    eprintln!("step {i}: {opcode} -> {}", describe(&value));
                }
            }
            Step::Effect { opcode, args } => runner
                .effects
                .call(&mut runner.stage, &opcode, &args)
                .with_context(|| format!("step {i}: {opcode}"))?,
            Step::Position { sprite, x, y } => {
                let target = runner.sprite(sprite)?;
                runner.stage.set_sprite_position(target, x, y);
            }
            Step::Frame { count } => {
                for _ in 0..count {
                    runner.frame()?;
                }
            }
        }
    }
    for _ in 0..args.frames {
        runner.frame()?;
    }

    runner.stage.write_png(&args.out)?;
    eprintln!(
        "wrote {} after {} frames",
        args.out.display(),
        runner.stage.frame_count()
    );
    Ok(())
}

fn describe(value: &recanvas::BlockValue) -> String {
    match value {
        recanvas::BlockValue::Number(n) => n.to_string(),
        recanvas::BlockValue::Text(s) => format!("{s:?}"),
        recanvas::BlockValue::ImageData(f) => format!("image data {}x{}", f.width, f.height),
    }
}

fn cmd_fx(args: FxArgs) -> anyhow::Result<()> {
    let img = image::open(&args.in_path)
        .with_context(|| format!("open image '{}'", args.in_path.display()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    let mut frame = FrameRGBA {
        width,
        height,
        data: img.into_raw(),
        premultiplied: false,
    };

    match args.effect {
        Effect::Wave {
            strength,
            frequency,
            speed,
            frame: frame_no,
        } => recanvas::effects::apply_wave(
            &mut frame,
            &WaveParams::new(strength, frequency, speed),
            frame_no,
        ),
        Effect::Split { strength } => recanvas::effects::channel_split(&mut frame, strength),
        Effect::Glitch { frequency, seed } => {
            let mut rng = seed.map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
            recanvas::effects::glitch(&mut frame, frequency, &GlitchParams::default(), &mut rng);
        }
    }

    image::save_buffer(
        &args.out,
        &frame.data,
        width,
        height,
        image::ExtendedColorType::Rgba8,
    )
    .with_context(|| format!("write '{}'", args.out.display()))?;
    Ok(())
}
