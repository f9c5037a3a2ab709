
pub mod cache;
pub mod cube;
pub mod error;
pub mod gen;
pub mod mapped;
pub mod results;
pub mod rotations;
pub mod store;

pub use cube::{Cube, Dim, Point};
pub use error::Error;

pub fn make_bar(len: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let bar = ProgressBar::new(len);

    let pos_width = format!("{len}").len();

    let template =
        format!("[{{elapsed_precise}}] {{bar:40.cyan/blue}} {{pos:>{pos_width}}}/{{len}} {{msg}}");

    bar.set_style(
        ProgressStyle::with_template(&template)
            .unwrap()
            .progress_chars("#>-"),
    );
    bar
}
