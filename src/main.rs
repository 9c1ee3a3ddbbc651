// GUI-subsystem binary: no console window is ever allocated by Windows.
// In both tuner and batch mode AttachConsole(ATTACH_PARENT_PROCESS) attaches to
// the launching terminal (if any), then we reopen CONOUT$ so Rust's println!/eprintln!
// route through the correct handles (necessary when SUBSYSTEM:WINDOWS is set).
// Launched from Explorer there is no parent console and output is dropped.
#![windows_subsystem = "windows"]

use std::process::ExitCode;

use clap::Parser;
use eframe::egui;
use log::{error, warn};

use treelayers::app::{self, window_title, FailureSlot, TunerApp};
use treelayers::cli::{self, CliArgs, TuneArgs};
use treelayers::io::load_image;
use treelayers::logger;
use treelayers::ops::text;
use treelayers::session::{Session, SessionOptions};

fn main() -> ExitCode {
    #[cfg(target_os = "windows")]
    attach_parent_console();

    // Initialize session log (overwrites previous session log)
    logger::init();

    // -- Batch / headless mode -------------------------------------------
    if CliArgs::is_cli_mode() {
        return cli::run(CliArgs::parse());
    }

    // -- Tuner mode -------------------------------------------------------
    let args = TuneArgs::parse();

    let layers = match cli::select_layers(args.layers.as_deref(), args.preset) {
        Ok(set) => set,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.dump_layers {
        return cli::dump_layers(&layers);
    }

    let Some(image_path) = args.image else {
        error!("no image given");
        return ExitCode::FAILURE;
    };

    // Startup failure aborts before any window exists.
    let source = match load_image(&image_path) {
        Ok(img) => img,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let start = layers.start_index(args.layer);
    println!("\nImage:  {} ({}x{})", image_path.display(), source.width(), source.height());
    println!("Output: {}\n", args.output_dir.display());
    print!("{}", layers.listing(start));

    let font = text::load_ui_font();
    if font.is_none() {
        warn!("No system UI font found; header text is drawn by the window instead");
    }

    let options = SessionOptions {
        output_dir: args.output_dir,
        display_width: args.display_width.max(1),
        font,
    };
    let session = match Session::new(source, layers, start, options, std::io::stdout()) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let title = window_title(&session);
    let native = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 900.0])
            .with_title(title),
        ..Default::default()
    };

    let failure = FailureSlot::default();
    let slot = failure.clone();
    let run = eframe::run_native(
        "TreeLayers",
        native,
        Box::new(move |cc| Box::new(TunerApp::new(cc, session, slot))),
    );
    app::exit_code(run, &failure)
}

/// The binary is SUBSYSTEM:WINDOWS so Windows never allocates a console.
/// Attach to the parent terminal and reconnect stdout/stderr so that
/// println!/eprintln! write to the correct console buffer.
#[cfg(target_os = "windows")]
fn attach_parent_console() {
    unsafe extern "system" {
        fn AttachConsole(dwProcessId: u32) -> i32;
        fn SetStdHandle(nStdHandle: u32, hHandle: isize) -> i32;
        fn CreateFileW(
            lpFileName: *const u16,
            dwDesiredAccess: u32,
            dwShareMode: u32,
            lpSecurityAttributes: *const std::ffi::c_void,
            dwCreationDisposition: u32,
            dwFlagsAndAttributes: u32,
            hTemplateFile: isize,
        ) -> isize;
    }
    const ATTACH_PARENT_PROCESS: u32 = 0xFFFF_FFFF;
    const GENERIC_WRITE: u32 = 0x4000_0000;
    const FILE_SHARE_READ_WRITE: u32 = 0x0000_0003;
    const OPEN_EXISTING: u32 = 3;
    const STD_OUTPUT_HANDLE: u32 = 0xFFFF_FFF5_u32; // -11
    const STD_ERROR_HANDLE: u32 = 0xFFFF_FFF4_u32; // -12
    const INVALID_HANDLE_VALUE: isize = -1;
    unsafe {
        if AttachConsole(ATTACH_PARENT_PROCESS) == 0 {
            return;
        }
        let conout: Vec<u16> = "CONOUT$\0".encode_utf16().collect();
        let hout = CreateFileW(
            conout.as_ptr(),
            GENERIC_WRITE,
            FILE_SHARE_READ_WRITE,
            std::ptr::null(),
            OPEN_EXISTING,
            0,
            0,
        );
        if hout != INVALID_HANDLE_VALUE {
            SetStdHandle(STD_OUTPUT_HANDLE, hout);
            SetStdHandle(STD_ERROR_HANDLE, hout);
        }
    }
}
