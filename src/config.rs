//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WASP__*` 覆盖（双下划线表示嵌套，
//! 如 `WASP__SANDBOX__TIMEOUT_SECS=120`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub sandbox: SandboxSection,
    pub planner: PlannerSection,
    pub memory: MemorySection,
    pub search: SearchSection,
}

/// [app] 段：应用名与工作目录
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 上传文件的存放根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

/// [llm] 段：后端选择、模型与补全参数
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai 兼容端点 / mock；无 API Key 时自动降级为 mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// 单次补全请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout() -> u64 {
    60
}

/// [sandbox] 段：解释器、单步超时、输出上限
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSection {
    /// 解释器二进制（默认 python3；测试中可指向其他解释器）
    #[serde(default = "default_python_bin")]
    pub python_bin: String,
    /// 单次沙箱执行的硬超时（秒）
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,
    /// stdout / stderr 各自的最大字符数，超出截断
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            python_bin: default_python_bin(),
            timeout_secs: default_sandbox_timeout(),
            max_output_chars: default_max_output_chars(),
        }
    }
}

fn default_python_bin() -> String {
    "python3".to_string()
}

fn default_sandbox_timeout() -> u64 {
    60
}

fn default_max_output_chars() -> usize {
    10_000
}

/// [planner] 段：步数上限与默认值
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    /// 单个计划的最大步数（超出截断）
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// LLM 未给出步骤超时时使用的默认值（秒）
    #[serde(default = "default_step_timeout")]
    pub default_step_timeout_secs: u64,
    /// LLM 未给出置信度时使用的默认值
    #[serde(default = "default_confidence")]
    pub default_confidence: f32,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            default_step_timeout_secs: default_step_timeout(),
            default_confidence: default_confidence(),
        }
    }
}

fn default_max_steps() -> usize {
    8
}

fn default_step_timeout() -> u64 {
    60
}

fn default_confidence() -> f32 {
    0.8
}

/// [memory] 段：语义记忆容量与检索条数
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// 规划 / 合成时检索的历史解法条数
    #[serde(default = "default_retrieve_k")]
    pub retrieve_k: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            retrieve_k: default_retrieve_k(),
        }
    }
}

fn default_max_entries() -> usize {
    1000
}

fn default_retrieve_k() -> usize {
    3
}

/// [search] 段：抓取 URL 的超时、最大字符数、允许的域名白名单
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_search_timeout_secs(),
            max_result_chars: default_max_result_chars(),
            allowed_domains: default_allowed_domains(),
        }
    }
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_max_result_chars() -> usize {
    8000
}

fn default_allowed_domains() -> Vec<String> {
    vec![
        // 维基百科
        "en.wikipedia.org".into(),
        "zh.wikipedia.org".into(),
        // 中文常用
        "baike.baidu.com".into(),
        "item.jd.com".into(),
        "zhuanlan.zhihu.com".into(),
        // 开发者资源
        "github.com".into(),
        "raw.githubusercontent.com".into(),
        "stackoverflow.com".into(),
        "docs.rs".into(),
        "crates.io".into(),
        "docs.python.org".into(),
        "pypi.org".into(),
        "developer.mozilla.org".into(),
        // 学术 / 新闻
        "arxiv.org".into(),
        "news.ycombinator.com".into(),
        // 工具类
        "openweathermap.org".into(),
    ]
}

/// 从 config 目录加载配置，环境变量 WASP__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WASP__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WASP")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
