// 远程服务请求/响应结构

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// create_file / create_asset 请求体
#[derive(Debug, Clone, Serialize)]
pub struct CreateEntityRequest<'a> {
    pub name: &'a str,
    pub description: &'a str,
    /// 资源包内的文件列表（仅 create_asset）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<&'a [String]>,
}

/// 只携带实体 ID 的请求/响应体（create 响应、close 请求）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityId {
    #[serde(default)]
    pub id: Option<String>,
}

/// get_upload_url 请求体
///
/// 每个分片独立构造，不持久化
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkUploadDescriptor {
    /// 实体 ID
    pub id: String,
    /// 分片大小
    pub size: u64,
    /// 分片序号（从 1 开始）
    pub index: u64,
    /// 分片内容的 MD5（小写十六进制）
    pub md5: String,
}

/// get_upload_url 响应：分片上传目标
#[derive(Debug, Clone, Deserialize)]
pub struct UploadDestination {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

impl UploadDestination {
    pub fn headers(&self) -> impl Iterator<Item = (&String, &String)> {
        self.headers.iter().flat_map(|h| h.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_serialization() {
        let file = CreateEntityRequest {
            name: "reads.fastq",
            description: "",
            paths: None,
        };
        assert_eq!(
            serde_json::to_string(&file).unwrap(),
            r#"{"name":"reads.fastq","description":""}"#
        );

        let paths = vec!["a.txt".to_string(), "dir/b.txt".to_string()];
        let asset = CreateEntityRequest {
            name: "bundle.tar.gz",
            description: "# readme\nline 2",
            paths: Some(&paths),
        };
        let json: serde_json::Value = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["paths"][1], "dir/b.txt");
        assert_eq!(json["description"], "# readme\nline 2");
    }

    #[test]
    fn test_descriptor_field_names() {
        let desc = ChunkUploadDescriptor {
            id: "file-1".to_string(),
            size: 3,
            index: 1,
            md5: "900150983cd24fb0d6963f7d28e17f72".to_string(),
        };
        let json: serde_json::Value = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["id"], "file-1");
        assert_eq!(json["size"], 3);
        assert_eq!(json["index"], 1);
        assert_eq!(json["md5"], "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_destination_parsing() {
        let dest: UploadDestination = serde_json::from_str(
            r#"{"url":"https://bucket/part","headers":{"Content-Length":"3","Content-MD5":"x"}}"#,
        )
        .unwrap();
        assert_eq!(dest.url, "https://bucket/part");
        assert_eq!(dest.headers().count(), 2);

        let dest: UploadDestination = serde_json::from_str(r#"{"headers":null}"#).unwrap();
        assert!(dest.url.is_empty());
        assert_eq!(dest.headers().count(), 0);

        // 非字符串头部值不符合协议
        assert!(serde_json::from_str::<UploadDestination>(
            r#"{"url":"u","headers":{"Content-Length":3}}"#
        )
        .is_err());
    }
}
