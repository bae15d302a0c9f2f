use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pagewarp")]
#[command(about = "Walk a site through a navigation session")]
#[command(version)]
pub struct Cli {
    /// Site origin, e.g. `example.com` or `https://example.com`
    pub origin: String,

    /// Paths to visit in order after the landing page
    pub paths: Vec<String>,

    /// Landing path the session starts on
    #[arg(long, default_value = "/")]
    pub start: String,

    /// Prefetch up to this many links harvested from the landing page
    #[arg(long, default_value_t = 0)]
    pub prefetch: usize,

    /// Go back this many entries once every path has been visited
    #[arg(long, default_value_t = 0)]
    pub back: usize,

    /// Reload the final page
    #[arg(long)]
    pub reload: bool,
}
