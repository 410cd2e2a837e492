use std::io::Write;

/// 默认的日志等级，可以通过 `RUST_LOG` 覆盖
const DEFAULT_LEVEL: log::LevelFilter = log::LevelFilter::Info;

/// 初始化全局 logger，只应该在 binary 的入口调用一次
///
/// 格式：`[时间] 等级 [文件:行号] 内容`
pub fn init_log() {
    let mut builder = env_logger::Builder::new();
    builder.format(|buf, record| {
        let info_style = buf
            .default_level_style(log::Level::Info)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
        let warn_style = buf
            .default_level_style(log::Level::Warn)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
        let error_style = buf
            .default_level_style(log::Level::Error)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

        let level_style = match record.level() {
            log::Level::Info => info_style,
            log::Level::Warn => warn_style,
            log::Level::Error => error_style,
            _ => buf.default_level_style(record.level()),
        };
        let file_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));
        let msg_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(75, 75, 75))));

        let line = record.line().unwrap_or(!0);
        let file = short_file_name(record.file().unwrap_or(""));
        let time = chrono::Local::now().format("%H:%M:%S%.3f");
        let level = record.level();

        writeln!(
            buf,
            "{level_style}[{time}] {level}{level_style:#} {file_style}[{file}:{line}]{file_style:#} \
             {msg_style}{}{msg_style:#}",
            record.args()
        )
    });
    builder.filter(None, DEFAULT_LEVEL);

    // RUST_LOG 优先
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    // 重复初始化时（例如多个测试）忽略错误
    let _ = builder.try_init();
}

/// 只保留文件名，兼容 windows 和 unix 的路径分隔符
fn short_file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_file_name_strips_directories() {
        assert_eq!(short_file_name("engine/crates/ember-gfx/src/gfx.rs"), "gfx.rs");
        assert_eq!(short_file_name("C:\\ember\\src\\lib.rs"), "lib.rs");
        assert_eq!(short_file_name("main.rs"), "main.rs");
    }

    #[test]
    fn init_log_twice_is_harmless() {
        init_log();
        init_log();
        log::info!("logger initialized twice");
    }
}
