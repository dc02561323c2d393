// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::engines::traits::EngineError;

/// 提取规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub selector: String,
    /// 为空时提取文本
    #[serde(default)]
    pub attr: Option<String>,
    #[serde(default)]
    pub is_array: bool,
}

/// 选择器规格：既可以是单纯的CSS字符串，也可以是完整规则
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SelectorSpec {
    Css(String),
    Rule(ExtractionRule),
}

impl From<SelectorSpec> for ExtractionRule {
    fn from(spec: SelectorSpec) -> Self {
        match spec {
            SelectorSpec::Css(selector) => ExtractionRule {
                selector,
                attr: None,
                is_array: false,
            },
            SelectorSpec::Rule(rule) => rule,
        }
    }
}

/// 提取服务
///
/// 负责从 HTML 内容中按CSS选择器提取结构化数据
pub struct ExtractionService;

impl ExtractionService {
    /// 解析并校验自定义选择器
    ///
    /// # 参数
    ///
    /// * `options` - `backend_options["selectors"]` 的值，形如 `{"name": "css"}` 或
    ///   `{"name": {"selector": "css", "attr": "href", "is_array": true}}`
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<(String, ExtractionRule)>)` - 按名称排序的规则
    /// * `Err(EngineError)` - 选项格式错误或选择器不合法
    pub fn parse_rules(options: Option<&Value>) -> Result<Vec<(String, ExtractionRule)>, EngineError> {
        let Some(options) = options else {
            return Ok(Vec::new());
        };

        let specs: Map<String, Value> = match options {
            Value::Object(map) => map.clone(),
            Value::Null => return Ok(Vec::new()),
            _ => {
                return Err(EngineError::Other(
                    "backend option `selectors` must be an object".to_string(),
                ))
            }
        };

        let mut rules = Vec::with_capacity(specs.len());
        for (name, spec) in specs {
            let spec: SelectorSpec = serde_json::from_value(spec).map_err(|e| EngineError::Selector {
                selector: name.clone(),
                message: e.to_string(),
            })?;
            let rule = ExtractionRule::from(spec);
            compile(&rule.selector)?;
            rules.push((name, rule));
        }
        rules.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(rules)
    }

    /// 按规则提取数据
    ///
    /// 单值规则未匹配时为 `null`，数组规则未匹配时为空数组
    pub fn extract(
        html_content: &str,
        rules: &[(String, ExtractionRule)],
    ) -> Result<Map<String, Value>, EngineError> {
        let document = Html::parse_document(html_content);
        let mut result = Map::new();

        for (key, rule) in rules {
            let selector = compile(&rule.selector)?;

            if rule.is_array {
                let values = document
                    .select(&selector)
                    .filter_map(|element| element_value(&element, rule.attr.as_deref()))
                    .filter(|v| !v.is_empty())
                    .map(Value::String)
                    .collect();
                result.insert(key.clone(), Value::Array(values));
            } else {
                let value = document
                    .select(&selector)
                    .next()
                    .and_then(|element| element_value(&element, rule.attr.as_deref()))
                    .map(Value::String)
                    .unwrap_or(Value::Null);
                result.insert(key.clone(), value);
            }
        }

        Ok(result)
    }
}

fn compile(selector: &str) -> Result<Selector, EngineError> {
    Selector::parse(selector).map_err(|e| EngineError::Selector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

fn element_value(element: &scraper::ElementRef<'_>, attr: Option<&str>) -> Option<String> {
    match attr {
        Some(attr) => element.value().attr(attr).map(|s| s.trim().to_string()),
        None => Some(
            element
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string(),
        ),
    }
}

#[cfg(test)]
#[path = "extraction_service_test.rs"]
mod tests;
