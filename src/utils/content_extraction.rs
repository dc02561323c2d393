// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::utils::url_utils::resolve_url;

static MARKDOWN_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[^\]]*\]\((https?://[^)\s]+|/[^)\s]*)\)").expect("valid markdown link pattern")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is", "are",
    "was", "were", "this", "that", "from", "have", "has", "will", "your", "their", "they",
    "which", "about", "into", "more", "than",
];

/// 页面元数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

/// 将HTML转换为Markdown
pub fn html_to_markdown(html: &str) -> String {
    html2md::parse_html(html).trim().to_string()
}

/// 从HTML中提取标题和描述
pub fn extract_metadata(html: &str) -> PageMetadata {
    let document = Html::parse_document(html);
    PageMetadata {
        title: select_text(&document, "title"),
        description: select_attr(&document, "meta[name='description']", "content"),
    }
}

/// 提取页面的可见文本，合并空白
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let body = Selector::parse("body").expect("valid body selector");
    let text: String = match document.select(&body).next() {
        Some(body) => body.text().collect::<Vec<_>>().join(" "),
        None => document.root_element().text().collect::<Vec<_>>().join(" "),
    };
    WHITESPACE.replace_all(text.trim(), " ").to_string()
}

/// 从HTML中提取所有 http(s) 链接，按出现顺序去重
///
/// 片段、mailto 和 javascript 链接会被忽略，相对路径会基于 `base_url` 解析
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("valid anchor selector");

    let hrefs = document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"));
    collect_links(&base, hrefs)
}

/// 从Markdown中提取内联链接
pub fn extract_markdown_links(markdown: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let hrefs = MARKDOWN_LINK
        .captures_iter(markdown)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()));
    collect_links(&base, hrefs)
}

fn collect_links<'a>(base: &Url, hrefs: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in hrefs {
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("javascript:")
        {
            continue;
        }

        if let Ok(mut url) = resolve_url(base, href) {
            if url.scheme() != "http" && url.scheme() != "https" {
                continue;
            }
            url.set_fragment(None);
            let link = url.to_string();
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }
    }

    links
}

/// 截取前 `max_chars` 个字符作为摘要，超出时追加省略号
pub fn summarize(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head.trim_end())
}

/// 取文本中第一行有意义的内容作为标题
pub fn first_meaningful_line(text: &str) -> Option<String> {
    text.lines()
        .take(5)
        .map(|line| line.trim().trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(100).collect())
}

/// 简单关键词提取：去掉停用词和短词，按首次出现顺序去重
pub fn extract_keywords(text: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();

    for word in text.split_whitespace() {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if word.chars().count() <= 3 || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        if seen.insert(word.clone()) {
            keywords.push(word);
            if keywords.len() == limit {
                break;
            }
        }
    }

    keywords
}

fn select_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

fn select_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
