//! panelgrab —— 可断点续传的网络漫画分页爬取器
//!
//! 通过真实浏览器会话逐页推进漫画档案：提取图片地址、可选标题与
//! 下一页链接，落盘图片并推进每个系列的游标。核心是可恢复的分页
//! 状态机：会话级故障触发丢弃重建，进度即时持久化，中断后精确续传。

pub mod core;
pub mod engine;
pub mod interfaces;
pub mod network;
pub mod ui;
pub mod utils;
