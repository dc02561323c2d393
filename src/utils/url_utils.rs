// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use url::{ParseError, Position, Url};

use crate::utils::errors::ValidationError;

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 校验待爬取的URL：必须是绝对的 http(s) 地址且带有主机名
pub fn parse_crawl_url(raw: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ValidationError::new("url", format!("`{}` is not a valid URL: {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ValidationError::new(
            "url",
            format!("unsupported scheme `{}`, expected http or https", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(ValidationError::new("url", "missing host"));
    }

    Ok(url)
}

/// 规范化URL，用于生成缓存键和去重
///
/// scheme 与主机名小写化、去掉默认端口和片段、去掉路径末尾的斜杠，
/// 使 `HTTPS://Example.com/` 与 `https://example.com` 映射到同一个键
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    match Url::parse(trimmed) {
        Ok(mut url) => {
            url.set_fragment(None);
            let path = url.path().trim_end_matches('/').to_string();
            format!(
                "{}{}{}",
                &url[..Position::BeforePath],
                path,
                &url[Position::AfterPath..]
            )
        }
        Err(_) => {
            // Unparseable input still gets the cosmetic normalization
            let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
            let lowered = match without_fragment.split_once("://") {
                Some((scheme, rest)) => format!("{}://{}", scheme.to_ascii_lowercase(), rest),
                None => without_fragment.to_string(),
            };
            lowered.trim_end_matches('/').to_string()
        }
    }
}

/// 判断两个URL是否属于同一主机
pub fn same_host(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a.host_str().is_some() && a.host_str() == b.host_str(),
        _ => false,
    }
}
