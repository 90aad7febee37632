mod cli;

use crate::cli::app::App;

fn main() -> anyhow::Result<()> {
    let app = App::parse_args();
    app.run()
}
