//! 配置管理系统 (Configuration Management)
//!
//! 负责 `config.json` 的读写：首跑生成默认骨架，加载时向前兼容地
//! 回填缺失键（不丢弃未识别字段），并以写临时文件再替换的方式原子落盘。
//! 该文档同时承担进度持久化：每个系列的 `url` / `page_num` 游标就写在这里。

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use bon::Builder;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::core::error::{CrawlError, Result};
use crate::core::model::{DownloadBy, SeriesState};

/// 运行级配置选项
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct Settings {
    /// 翻页后的安定等待（秒）
    #[serde(default = "default_delay")]
    #[builder(default = 0.25)]
    pub delay: f64,

    /// 内容类型无法映射时的扩展名
    #[serde(default = "default_fallback_extension")]
    #[builder(default = default_fallback_extension())]
    pub fallback_extension: String,

    /// 系列处理顺序
    #[serde(default)]
    #[builder(default)]
    pub download_by: DownloadBy,

    /// 目标文件已存在时是否覆盖
    #[serde(default)]
    #[builder(default)]
    pub overwrite_existing: bool,

    /// 每页成功后是否把游标写回配置
    #[serde(default)]
    #[builder(default)]
    pub update_config: bool,

    /// 输出根目录，每个系列占一个子目录
    #[serde(default = "default_output_dir")]
    #[builder(default = default_output_dir())]
    pub output_dir: String,

    /// 自动化浏览器 (Chromium) 相关配置
    #[serde(default)]
    #[builder(default)]
    pub browser: BrowserConfig,
}

/// 浏览器引擎配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct BrowserConfig {
    /// 是否以无头模式 (Headless) 运行
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// 自定义可执行文件路径
    pub chrome_path: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
        }
    }
}

fn default_delay() -> f64 {
    0.25
}
fn default_fallback_extension() -> String {
    "png".to_string()
}
fn default_output_dir() -> String {
    "comics".to_string()
}
fn default_headless() -> bool {
    true
}

impl Settings {
    pub fn delay_duration(&self) -> Duration {
        Duration::from_secs_f64(self.delay.max(0.0))
    }
}

/// 默认配置骨架，首跑时原样写入磁盘
fn default_skeleton() -> Value {
    json!({
        "delay": 0.25,
        "fallback_extension": "png",
        "download_by": "order",
        "overwrite_existing": false,
        "update_config": false,
        "output_dir": "comics",
        "browser": {
            "headless": true,
            "chrome_path": null
        },
        "comics": [{
            "enabled": true,
            "name": "Comic Name",
            "url": "COMIC_PAGE_1_URL",
            "page_num": 1,
            "image_selector": ["id", "cc-comic"],
            "title_selector": ["class_name", "cc-newsheader"],
            "next_selector": ["class_name", "cc-next"]
        }]
    })
}

/// 配置与进度存储
///
/// 以原始 JSON 文档为持久化真相：类型化视图只读取，
/// 写回始终基于文档本身，保证未识别字段不被丢弃。
pub struct ConfigStore {
    path: PathBuf,
    doc: Value,
    rewrote_on_load: bool,
}

impl ConfigStore {
    /// 打开（或初始化）配置存储
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (mut doc, mut changed) = match std::fs::read_to_string(&path) {
            Ok(text) => {
                let doc: Value = serde_json::from_str(&text).map_err(|e| {
                    CrawlError::Config(format!("invalid JSON in {}: {}", path.display(), e))
                })?;
                (doc, false)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (default_skeleton(), true),
            Err(e) => return Err(e.into()),
        };

        if ensure_defaults(&mut doc, &default_skeleton()) {
            changed = true;
        }

        // download_by 非法值纠正为 order 并持久化
        let download_by_ok = doc
            .get("download_by")
            .and_then(Value::as_str)
            .is_some_and(|s| DownloadBy::from_str(s).is_ok());
        if !download_by_ok {
            warn!(
                "Invalid download_by {:?}, falling back to \"order\"",
                doc.get("download_by")
            );
            doc["download_by"] = json!("order");
            changed = true;
        }

        if changed {
            write_doc(&path, &doc)?;
        }

        Ok(Self {
            path,
            doc,
            rewrote_on_load: changed,
        })
    }

    /// 加载时是否发生过回填重写
    pub fn rewrote_on_load(&self) -> bool {
        self.rewrote_on_load
    }

    /// 类型化运行配置视图
    pub fn settings(&self) -> Result<Settings> {
        serde_json::from_value(self.doc.clone())
            .map_err(|e| CrawlError::Config(format!("bad settings: {}", e)))
    }

    /// 按声明顺序给出全部系列状态
    pub fn series(&self) -> Result<Vec<SeriesState>> {
        let comics = self
            .doc
            .get("comics")
            .cloned()
            .unwrap_or_else(|| json!([]));
        serde_json::from_value(comics)
            .map_err(|e| CrawlError::Config(format!("bad comics entry: {}", e)))
    }

    /// 推进并落盘一个系列的游标（按声明序号定位）
    pub fn record_progress(&mut self, index: usize, url: &str, page_num: u32) -> Result<()> {
        let entry = self
            .doc
            .get_mut("comics")
            .and_then(Value::as_array_mut)
            .and_then(|a| a.get_mut(index))
            .ok_or_else(|| CrawlError::Config(format!("no comics entry at index {}", index)))?;

        entry["url"] = json!(url);
        entry["page_num"] = json!(page_num);
        write_doc(&self.path, &self.doc)
    }
}

/// 递归回填缺失键；返回是否有修改
///
/// 默认值中的数组若以对象作为首元素，则把该对象作为模板
/// 逐一补全配置数组里的每个对象成员。
fn ensure_defaults(config: &mut Value, default: &Value) -> bool {
    let Some(default_map) = default.as_object() else {
        return false;
    };
    let Some(config_map) = config.as_object_mut() else {
        return false;
    };

    let mut changed = false;
    for (key, default_value) in default_map {
        match config_map.get_mut(key) {
            None => {
                config_map.insert(key.clone(), default_value.clone());
                changed = true;
            }
            Some(existing) => {
                if default_value.is_object() && existing.is_object() {
                    changed |= ensure_defaults(existing, default_value);
                } else if let (Some(items), Some(template)) = (
                    existing.as_array_mut(),
                    default_value.as_array().and_then(|a| a.first()),
                ) && template.is_object()
                {
                    for item in items.iter_mut().filter(|i| i.is_object()) {
                        changed |= ensure_defaults(item, template);
                    }
                }
            }
        }
    }
    changed
}

/// 原子写入：先写临时文件再替换，半截写坏不了整个存储
fn write_doc(path: &Path, doc: &Value) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("json.tmp");
    let text = serde_json::to_string_pretty(doc)?;
    std::fs::write(&tmp, text)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
