fn main() -> anyhow::Result<()> {
    notecards::cli::run()
}
