fn main() -> anyhow::Result<()> {
    zeile::run()
}
