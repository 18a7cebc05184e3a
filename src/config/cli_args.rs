use clap::Parser;
use std::path::PathBuf;

// Distestor - 在一批执行环境上运行分布式功能测试
#[derive(Parser, Debug)]
#[clap(
    name = "distestor",
    version,
    about = "Run functional tests of a distributed application across a batch of environments",
    after_help = "ENVIRONMENT TYPES (set in the config file):\n  local | locally        Temporary directories on this machine\n  ssh | remote           One environment per SSH host\n\nEXIT STATUS:\n  0                      All scripts succeeded\n  1                      At least one script failed\n  2                      The configuration could not be used\n\nEXAMPLES:\n  distestor -c distestor.toml\n  distestor -c ci.toml --script sanity --script restart -v\n  distestor --keep-environments --report-dir reports/debug"
)]
pub struct CliArgs {
    // Config file - Path to the run configuration
    // 配置文件 - 运行配置文件路径
    #[clap(
        short = 'c',
        long = "config",
        default_value = "distestor.toml",
        help = "Run configuration file"
    )]
    pub config: PathBuf,

    // Verbose mode - Show more log information
    // 详细模式 - 显示更多日志信息
    #[clap(short = 'v', long = "verbose", help = "Enable verbose logging")]
    pub verbose: bool,

    // Quiet mode - Only show errors
    // 安静模式 - 只显示错误
    #[clap(short = 'q', long = "quiet", help = "Suppress non-essential output")]
    pub quiet: bool,

    // Reports directory - Overrides report_dir from the config file
    // 报告目录 - 覆盖配置文件中的 report_dir
    #[clap(long = "report-dir", help = "Output directory for reports")]
    pub report_dir: Option<PathBuf>,

    // Skip preparation - Only restore environments
    // 跳过准备 - 只恢复环境
    #[clap(long = "skip-prepare", help = "Restore instead of preparing environments")]
    pub skip_prepare: bool,

    // Keep environments - Neither clean nor destroy environments
    // 保留环境 - 不清理也不销毁环境
    #[clap(long = "keep-environments", help = "Leave environments standing for inspection")]
    pub keep_environments: bool,

    // Script filter - Run only the named scripts
    // 脚本筛选 - 只运行指定名称的脚本
    #[clap(long = "script", help = "Run only the named script (repeatable)")]
    pub scripts: Vec<String>,
}

impl CliArgs {
    /// Parse command line arguments
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get log level
    /// 获取日志级别
    pub fn get_log_level(&self) -> &str {
        if self.quiet {
            "error"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
