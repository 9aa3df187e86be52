// api 命令：调用任意 API 路由

use crate::api::PfdaClient;
use anyhow::{bail, Context, Result};
use std::path::Path;

/// 校验 JSON 负载
pub fn validate_json(payload: &str) -> Result<()> {
    if let Err(e) = serde_json::from_str::<serde_json::Value>(payload) {
        bail!("提供的 JSON '{}' 无效: {}", payload, e);
    }
    Ok(())
}

/// 调用路由，响应写到标准输出或文件
///
/// # 返回
/// 响应字节数
pub async fn call_route(client: &PfdaClient, route: &str, json: Option<&str>, output: Option<&Path>) -> Result<usize> {
    if route.trim().is_empty() {
        bail!("API 路由不能为空");
    }

    let payload = json.unwrap_or_default();
    if !payload.is_empty() {
        validate_json(payload)?;
    }

    let route = route.trim().to_lowercase();
    let body = client
        .call_route(&route, payload)
        .await
        .with_context(|| format!("调用 API '{}' 失败", route))?;

    match output {
        None => {
            println!(
                "Return response data for API call '{}':\n{}",
                route,
                String::from_utf8_lossy(&body)
            );
        }
        Some(path) => {
            tokio::fs::write(path, &body)
                .await
                .with_context(|| format!("写入响应文件失败: {}", path.display()))?;
            println!(
                "Downloaded response data for API call: {} ({} bytes) to file '{}'",
                route,
                body.len(),
                path.display()
            );
        }
    }

    Ok(body.len())
}
