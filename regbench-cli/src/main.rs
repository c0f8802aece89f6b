fn main() -> anyhow::Result<()> {
    regbench_cli::run()
}
