//! 本地静态资源目录服务。

use std::path::Path;
use tower_http::services::ServeDir;

/// 未匹配路由的请求从 `dir` 提供文件，目录请求回退到 `index.html`。
pub fn static_assets(dir: &Path) -> ServeDir {
    ServeDir::new(dir).append_index_html_on_directories(true)
}
