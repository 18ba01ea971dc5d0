use log::LevelFilter;

pub fn set_up_logging(default_log_level: LevelFilter) -> anyhow::Result<()> {
    env_logger::Builder::new()
        .filter_level(default_log_level)
        .parse_default_env()
        .try_init()?;
    Ok(())
}
