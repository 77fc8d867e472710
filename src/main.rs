use anyhow::Result;

fn main() -> Result<()> {
    svindex::cli::run()
}
