use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::info;
use tempfile::NamedTempFile;

use jpeg2pdf::{CmykPolarity, Config};


#[derive(Parser)]
#[command(version, about = "Wraps a JPEG image into a single-page PDF without re-encoding it")]
struct Opts {
    /// Drop APPn (except Adobe APP14) and comment blocks from the embedded JPEG.
    #[arg(short, long)]
    remove_optional_metadata: bool,

    /// Pixels per inch used to size the page.
    #[arg(short, long, default_value_t = 72.0)]
    dpi: f64,

    /// Size the page from the JFIF density block when it has a physical unit.
    #[arg(short, long)]
    jfif_density: bool,

    /// Polarity of four-component (CMYK) image data.
    #[arg(short, long, value_enum, default_value_t = CmykPolarity::Auto)]
    cmyk_polarity: CmykPolarity,

    /// Store the image stream ASCII85-encoded.
    #[arg(short, long)]
    ascii85: bool,

    input_jpeg_path: PathBuf,

    /// Defaults to the input path with a .pdf extension.
    output_pdf_path: Option<PathBuf>,
}


fn write_atomically(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(directory)?;
    temp_file.write_all(data)?;
    temp_file.flush()?;
    temp_file.persist(path)?;
    Ok(())
}


fn run(opts: &Opts) -> Result<PathBuf, jpeg2pdf::Error> {
    let config = Config {
        dpi: opts.dpi,
        strip_metadata: opts.remove_optional_metadata,
        use_jfif_density: opts.jfif_density,
        cmyk_polarity: opts.cmyk_polarity,
        ascii85: opts.ascii85,
    };

    let jpeg_data = fs::read(&opts.input_jpeg_path)?;
    let pdf_data = jpeg2pdf::convert(&jpeg_data, &config)?;

    let output_path = opts.output_pdf_path.clone()
        .unwrap_or_else(|| opts.input_jpeg_path.with_extension("pdf"));
    write_atomically(&output_path, &pdf_data)?;
    Ok(output_path)
}


fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .init();

    let opts = Opts::parse();
    match run(&opts) {
        Ok(output_path) => {
            info!("wrote {}", output_path.display());
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("jpeg2pdf: {}: {}", opts.input_jpeg_path.display(), e);
            ExitCode::FAILURE
        },
    }
}
