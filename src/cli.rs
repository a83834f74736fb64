// ============================================================================
// SheetOverlay CLI - headless compositing of two drawings into one PNG
// ============================================================================
//
// Usage examples:
//   SheetOverlay --first plan_a.png --second plan_b.png --output diff.png
//   SheetOverlay --first a.jpg --second b.jpg --dx 50 --dy -30 --rotate 10 -o out.png
//   SheetOverlay --first a.png --second b.png --highlight-overlap --swap -o out.png
//
// Both layers are recolored (layer 1 red, layer 2 green by default), layer 2
// is placed with the given transform, and the clean composite is written out.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::canvas::{LayerId, LayerTransform};
use crate::error::Result;
use crate::io::{load_source, write_png};
use crate::project::Session;
use crate::settings::EditorSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Overlay two drawings in contrasting colors and export the composite.
#[derive(Parser, Debug)]
#[command(
    name = "SheetOverlay",
    about = "Overlay two drawings in contrasting colors and export the composite as PNG"
)]
pub struct CliArgs {
    /// Reference drawing (layer 1).
    #[arg(long, value_name = "FILE")]
    pub first: PathBuf,

    /// Drawing to compare (layer 2).
    #[arg(long, value_name = "FILE")]
    pub second: PathBuf,

    /// Output PNG path.
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// JSON settings file. Missing keys keep their defaults.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Session key recorded in the log. A random UUID when omitted.
    #[arg(long)]
    pub key: Option<String>,

    /// Layer 2 horizontal offset in display pixels.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub dx: f32,

    /// Layer 2 vertical offset in display pixels.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub dy: f32,

    /// Layer 2 clockwise rotation in degrees.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub rotate: f32,

    /// Layer 2 scale on top of the shared fit factor.
    #[arg(long, default_value_t = 1.0)]
    pub scale: f32,

    /// Layer 2 width stretch on top of --scale.
    #[arg(long, default_value_t = 1.0)]
    pub scale_x: f32,

    /// Layer 2 height stretch on top of --scale.
    #[arg(long, default_value_t = 1.0)]
    pub scale_y: f32,

    /// Thicken both drawings' strokes (1-10 px).
    #[arg(long, default_value_t = 1)]
    pub thickness: u32,

    /// Layer 2 opacity (0-1).
    #[arg(long, default_value_t = 1.0)]
    pub opacity: f32,

    /// Paint layer 1 above layer 2.
    #[arg(long)]
    pub swap: bool,

    #[arg(long)]
    pub hide_first: bool,

    #[arg(long)]
    pub hide_second: bool,

    /// Mark pixels where both drawings have content.
    #[arg(long)]
    pub highlight_overlap: bool,

    /// Write the session log here instead of the data directory.
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Print progress and timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    fn layer2_transform(&self) -> LayerTransform {
        LayerTransform {
            x: self.dx,
            y: self.dy,
            rotation_degrees: self.rotate,
            scale: self.scale,
            scale_x: self.scale_x,
            scale_y: self.scale_y,
            opacity: self.opacity,
            thickness: self.thickness,
        }
    }

    fn load_settings(&self) -> Result<EditorSettings> {
        let mut settings = match &self.settings {
            Some(path) => EditorSettings::load(path)?,
            None => EditorSettings::default(),
        };
        if self.highlight_overlap {
            settings.highlight_overlap = true;
        }
        Ok(settings)
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the headless composite and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    match run_inner(&args) {
        Ok(()) => {
            if args.verbose {
                println!(
                    "wrote {} in {:.2}s",
                    args.output.display(),
                    start.elapsed().as_secs_f64()
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Build a session from the arguments and prepare it, ready for export.
pub fn build_session(args: &CliArgs) -> Result<Session> {
    let settings = args.load_settings()?;
    let first = load_source(LayerId::First, &args.first)?;
    let second = load_source(LayerId::Second, &args.second)?;

    let mut session = Session::new(args.key.clone(), first, second, settings);
    session.prepare();
    session.set_thickness(args.thickness);
    session.set_transform(LayerId::Second, args.layer2_transform());
    if args.swap {
        session.swap_order();
    }
    if args.hide_first {
        session.set_visible(LayerId::First, false);
    }
    if args.hide_second {
        session.set_visible(LayerId::Second, false);
    }
    Ok(session)
}

fn run_inner(args: &CliArgs) -> Result<()> {
    let session = build_session(args)?;
    if args.verbose {
        println!("session {}", session.key);
    }
    let image = session.export_image();
    write_png(&image, &args.output)?;
    log::info!("exported {}", args.output.display());
    Ok(())
}
