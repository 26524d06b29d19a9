//! Field recognition
//!
//! Maps spreadsheet columns to semantic order fields. Two strategies
//! share one extraction path: an AI header mapper (when the text service
//! is enabled) and a keyword rule mapper. The AI result is discarded for
//! the rule mapping when its self-reported confidence falls below the
//! configured floor, so recognition always produces a mapping.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::MatchThresholds;
use crate::error::Result;
use crate::models::{RawRow, RecognizedFields};
use crate::services::ai_client::{extract_json, ChatClient};
use crate::services::similarity::keyword_confidence;

/// Semantic order fields a column can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    CustomerName,
    CustomerCode,
    ContactPerson,
    ContactPhone,
    DeliveryAddress,
    ProvinceName,
    CityName,
    DistrictName,
    ExpectedDeliveryDate,
    ProductSku,
    ProductName,
    ProductSpecification,
    Quantity,
    UnitPrice,
    Unit,
    OrderType,
    SpecialRequirements,
    Remarks,
    SourceOrderId,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::CustomerName => "customer_name",
            FieldKind::CustomerCode => "customer_code",
            FieldKind::ContactPerson => "contact_person",
            FieldKind::ContactPhone => "contact_phone",
            FieldKind::DeliveryAddress => "delivery_address",
            FieldKind::ProvinceName => "province_name",
            FieldKind::CityName => "city_name",
            FieldKind::DistrictName => "district_name",
            FieldKind::ExpectedDeliveryDate => "expected_delivery_date",
            FieldKind::ProductSku => "product_sku",
            FieldKind::ProductName => "product_name",
            FieldKind::ProductSpecification => "product_specification",
            FieldKind::Quantity => "quantity",
            FieldKind::UnitPrice => "unit_price",
            FieldKind::Unit => "unit",
            FieldKind::OrderType => "order_type",
            FieldKind::SpecialRequirements => "special_requirements",
            FieldKind::Remarks => "remarks",
            FieldKind::SourceOrderId => "source_order_id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ALL_FIELDS.iter().copied().find(|f| f.as_str() == s)
    }
}

const ALL_FIELDS: &[FieldKind] = &[
    FieldKind::CustomerName,
    FieldKind::CustomerCode,
    FieldKind::ContactPerson,
    FieldKind::ContactPhone,
    FieldKind::DeliveryAddress,
    FieldKind::ProvinceName,
    FieldKind::CityName,
    FieldKind::DistrictName,
    FieldKind::ExpectedDeliveryDate,
    FieldKind::ProductSku,
    FieldKind::ProductName,
    FieldKind::ProductSpecification,
    FieldKind::Quantity,
    FieldKind::UnitPrice,
    FieldKind::Unit,
    FieldKind::OrderType,
    FieldKind::SpecialRequirements,
    FieldKind::Remarks,
    FieldKind::SourceOrderId,
];

/// Keyword table for rule-based header mapping. Chinese labels first
/// since that is what real upload files carry.
fn field_keywords(field: FieldKind) -> &'static [&'static str] {
    match field {
        FieldKind::CustomerName => &["客户名称", "客户", "公司名称", "customer name", "customer", "company"],
        FieldKind::CustomerCode => &["客户编码", "客户代码", "customer code", "customer id"],
        FieldKind::ContactPerson => &["联系人", "收货人", "contact person", "contact", "receiver"],
        FieldKind::ContactPhone => &["联系电话", "电话", "手机号", "手机", "phone", "mobile", "tel"],
        FieldKind::DeliveryAddress => &["收货地址", "地址", "详细地址", "delivery address", "address"],
        FieldKind::ProvinceName => &["省份", "省", "province"],
        FieldKind::CityName => &["城市", "市", "city"],
        FieldKind::DistrictName => &["区县", "区", "县", "district", "county"],
        FieldKind::ExpectedDeliveryDate => &["交货日期", "发货日期", "期望交期", "delivery date", "expected date"],
        FieldKind::ProductSku => &["商品编码", "产品编码", "sku", "商品代码", "product code", "item code"],
        FieldKind::ProductName => &["商品名称", "产品名称", "品名", "product name", "product", "item name"],
        FieldKind::ProductSpecification => &["规格", "规格型号", "型号", "specification", "spec", "model"],
        FieldKind::Quantity => &["数量", "件数", "订购数量", "quantity", "qty", "count"],
        FieldKind::UnitPrice => &["单价", "价格", "unit price", "price"],
        FieldKind::Unit => &["单位", "计量单位", "unit of measure", "uom"],
        FieldKind::OrderType => &["订单类型", "order type"],
        FieldKind::SpecialRequirements => &["特殊要求", "特殊说明", "special requirements"],
        FieldKind::Remarks => &["备注", "说明", "remarks", "notes", "comment"],
        FieldKind::SourceOrderId => &["订单号", "原单号", "源订单号", "order no", "order number", "source order"],
    }
}

/// Column index to field assignment, with the mapper's overall confidence
#[derive(Debug, Clone)]
pub struct HeaderMapping {
    pub columns: HashMap<usize, FieldKind>,
    pub confidence: f64,
}

/// Keyword-rule header mapper
pub struct RuleRecognizer;

impl RuleRecognizer {
    /// Score every (column, field) pair: each field claims its
    /// best-scoring column, then a contended column keeps only its
    /// strongest field. Ties resolve to the lower column index and the
    /// earlier field in declaration order, so the same header list
    /// always yields the same mapping.
    pub fn map_headers(headers: &BTreeMap<usize, String>) -> HeaderMapping {
        let mut column_best: BTreeMap<usize, (FieldKind, f64)> = BTreeMap::new();

        for &field in ALL_FIELDS {
            let mut top: Option<(usize, f64)> = None;
            for (&idx, label) in headers {
                let score = field_keywords(field)
                    .iter()
                    .map(|kw| keyword_confidence(label, kw))
                    .fold(0.0_f64, f64::max);
                if score > 0.0 && top.map_or(true, |(_, s)| score > s) {
                    top = Some((idx, score));
                }
            }
            if let Some((idx, score)) = top {
                let claim = column_best.entry(idx).or_insert((field, score));
                if score > claim.1 {
                    *claim = (field, score);
                }
            }
        }

        let scores: Vec<f64> = column_best.values().map(|(_, s)| *s).collect();
        let confidence = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };

        let columns = column_best
            .into_iter()
            .map(|(idx, (field, _))| (idx, field))
            .collect();

        HeaderMapping { columns, confidence }
    }
}

#[derive(Debug, Deserialize)]
struct AiHeaderResponse {
    /// column index (as string) → field name
    mappings: HashMap<String, String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// AI header mapper; asks the text service to assign semantic fields
/// to the literal header labels.
pub struct AiRecognizer<'a> {
    client: &'a ChatClient,
}

impl<'a> AiRecognizer<'a> {
    pub fn new(client: &'a ChatClient) -> Self {
        Self { client }
    }

    /// Row-mode extraction: the AI maps one row's labeled cells to a
    /// flat field object with a self-reported confidence.
    pub async fn recognize_row(&self, row: &RawRow) -> Result<RecognizedFields> {
        let cells: Vec<String> = row
            .labeled_values()
            .map(|(header, value)| format!("{}: {}", header, value))
            .collect();
        if cells.is_empty() {
            return Err(crate::error::Error::AiService("Row has no labeled cells".into()));
        }
        let field_list: Vec<&str> = ALL_FIELDS.iter().map(|f| f.as_str()).collect();

        let prompt = format!(
            "Extract order fields from one spreadsheet row.\n\
             Cells (header: value):\n{}\n\n\
             Allowed field names: {}\n\n\
             Reply with JSON only: one flat object mapping field names to\n\
             string or number values, plus \"confidence\": <0.0-1.0>.\n\
             Omit fields the row does not contain.",
            cells.join("\n"),
            field_list.join(", "),
        );

        let completion = self.client.complete(&prompt, 1024, 0.1).await?;
        let json = extract_json(&completion).ok_or_else(|| {
            crate::error::Error::AiService("No JSON object in completion".into())
        })?;
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| crate::error::Error::AiService(format!("Bad row JSON: {}", e)))?;
        let object = value
            .as_object()
            .ok_or_else(|| crate::error::Error::AiService("Row JSON is not an object".into()))?;

        Ok(fields_from_ai_object(object, row.row_number))
    }

    pub async fn map_headers(&self, headers: &BTreeMap<usize, String>) -> Result<HeaderMapping> {
        let header_list: Vec<String> = headers
            .iter()
            .map(|(idx, label)| format!("{}: {}", idx, label))
            .collect();
        let field_list: Vec<&str> = ALL_FIELDS.iter().map(|f| f.as_str()).collect();

        let prompt = format!(
            "You map spreadsheet column headers to order fields.\n\
             Columns (index: header):\n{}\n\n\
             Allowed field names: {}\n\n\
             Reply with JSON only, no prose:\n\
             {{\"mappings\": {{\"<column index>\": \"<field name>\"}}, \"confidence\": <0.0-1.0>}}\n\
             Omit columns that match no field.",
            header_list.join("\n"),
            field_list.join(", "),
        );

        let completion = self.client.complete(&prompt, 1024, 0.1).await?;
        let json = extract_json(&completion).ok_or_else(|| {
            crate::error::Error::AiService("No JSON object in completion".into())
        })?;
        let parsed: AiHeaderResponse = serde_json::from_str(json)
            .map_err(|e| crate::error::Error::AiService(format!("Bad mapping JSON: {}", e)))?;

        let mut columns = HashMap::new();
        for (idx, field_name) in &parsed.mappings {
            let idx: usize = match idx.parse() {
                Ok(i) => i,
                Err(_) => continue,
            };
            if !headers.contains_key(&idx) {
                continue;
            }
            if let Some(field) = FieldKind::parse(field_name) {
                columns.insert(idx, field);
            } else {
                debug!("AI proposed unknown field name: {}", field_name);
            }
        }

        Ok(HeaderMapping {
            columns,
            confidence: parsed.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        })
    }
}

/// Recognizer facade: AI first when enabled, rules as the safety net
pub struct FallbackRecognizer {
    client: ChatClient,
    thresholds: MatchThresholds,
}

impl FallbackRecognizer {
    pub fn new(client: ChatClient, thresholds: MatchThresholds) -> Self {
        Self { client, thresholds }
    }

    /// Resolve the header mapping for one file. Never fails: any AI
    /// problem or low-confidence answer falls back to the rule mapper.
    pub async fn map_headers(&self, headers: &BTreeMap<usize, String>) -> HeaderMapping {
        if self.client.enabled() {
            match AiRecognizer::new(&self.client).map_headers(headers).await {
                Ok(mapping) if mapping.confidence >= self.thresholds.ai_header_min => {
                    debug!(
                        confidence = mapping.confidence,
                        columns = mapping.columns.len(),
                        "Using AI header mapping"
                    );
                    return mapping;
                }
                Ok(mapping) => {
                    debug!(
                        confidence = mapping.confidence,
                        "AI header mapping below floor, using rules"
                    );
                }
                Err(e) => {
                    warn!("AI header mapping failed, using rules: {}", e);
                }
            }
        }
        RuleRecognizer::map_headers(headers)
    }

    /// Recognize one row: AI extraction when enabled, deterministic
    /// extraction under the header mapping otherwise or on any AI
    /// failure.
    pub async fn recognize_row(&self, row: &RawRow, mapping: &HeaderMapping) -> RecognizedFields {
        if self.client.enabled() {
            match AiRecognizer::new(&self.client).recognize_row(row).await {
                Ok(fields) => return fields,
                Err(e) => {
                    warn!(row = row.row_number, "AI row recognition failed, using rules: {}", e);
                }
            }
        }
        extract_fields(row, mapping)
    }
}

/// Build `RecognizedFields` from an AI-returned flat object, coercing
/// numerics the same way the rule path does. Unknown keys are ignored;
/// the self-reported confidence is kept when positive, else replaced by
/// key-field completeness.
fn fields_from_ai_object(
    object: &serde_json::Map<String, serde_json::Value>,
    row_number: u32,
) -> RecognizedFields {
    let mut fields = RecognizedFields::default();

    for (key, value) in object {
        if key == "confidence" {
            fields.confidence = value.as_f64().map(|c| c.clamp(0.0, 1.0));
            continue;
        }
        let field = match FieldKind::parse(key) {
            Some(f) => f,
            None => {
                debug!(key = key.as_str(), "AI returned unknown field, ignoring");
                continue;
            }
        };
        let text = match value {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        if text.is_empty() {
            continue;
        }

        match field {
            FieldKind::CustomerName => fields.customer_name = Some(text),
            FieldKind::CustomerCode => fields.customer_code = Some(text),
            FieldKind::ContactPerson => fields.contact_person = Some(text),
            FieldKind::ContactPhone => fields.contact_phone = Some(text),
            FieldKind::DeliveryAddress => fields.delivery_address = Some(text),
            FieldKind::ProvinceName => fields.province_name = Some(text),
            FieldKind::CityName => fields.city_name = Some(text),
            FieldKind::DistrictName => fields.district_name = Some(text),
            FieldKind::ExpectedDeliveryDate => fields.expected_delivery_date = Some(text),
            FieldKind::ProductSku => fields.product_sku = Some(text),
            FieldKind::ProductName => fields.product_name = Some(text),
            FieldKind::ProductSpecification => fields.product_specification = Some(text),
            FieldKind::Quantity => match parse_quantity(&text) {
                Some(q) => fields.quantity = Some(q),
                None => warn!(row = row_number, value = text, "Unparseable quantity"),
            },
            FieldKind::UnitPrice => match parse_price(&text) {
                Some(p) => fields.unit_price = Some(p),
                None => warn!(row = row_number, value = text, "Unparseable unit price"),
            },
            FieldKind::Unit => fields.unit = Some(text),
            FieldKind::OrderType => fields.order_type = Some(text),
            FieldKind::SpecialRequirements => fields.special_requirements = Some(text),
            FieldKind::Remarks => fields.remarks = Some(text),
            FieldKind::SourceOrderId => fields.source_order_id = Some(text),
        }
    }

    if !fields.confidence.map(|c| c > 0.0).unwrap_or(false) {
        fields.confidence = Some(fields.key_field_confidence());
    }
    fields
}

/// Extract semantic fields from one row under a header mapping.
/// Numeric coercion failures leave the field unset with a warning; they
/// surface later as validation errors, not panics.
pub fn extract_fields(row: &RawRow, mapping: &HeaderMapping) -> RecognizedFields {
    let mut fields = RecognizedFields::default();

    for (&idx, &field) in &mapping.columns {
        let value = match row.values.get(idx).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            Some(v) => v,
            None => continue,
        };

        match field {
            FieldKind::CustomerName => fields.customer_name = Some(value.to_string()),
            FieldKind::CustomerCode => fields.customer_code = Some(value.to_string()),
            FieldKind::ContactPerson => fields.contact_person = Some(value.to_string()),
            FieldKind::ContactPhone => fields.contact_phone = Some(value.to_string()),
            FieldKind::DeliveryAddress => fields.delivery_address = Some(value.to_string()),
            FieldKind::ProvinceName => fields.province_name = Some(value.to_string()),
            FieldKind::CityName => fields.city_name = Some(value.to_string()),
            FieldKind::DistrictName => fields.district_name = Some(value.to_string()),
            FieldKind::ExpectedDeliveryDate => {
                fields.expected_delivery_date = Some(value.to_string())
            }
            FieldKind::ProductSku => fields.product_sku = Some(value.to_string()),
            FieldKind::ProductName => fields.product_name = Some(value.to_string()),
            FieldKind::ProductSpecification => {
                fields.product_specification = Some(value.to_string())
            }
            FieldKind::Quantity => match parse_quantity(value) {
                Some(q) => fields.quantity = Some(q),
                None => warn!(row = row.row_number, value, "Unparseable quantity"),
            },
            FieldKind::UnitPrice => match parse_price(value) {
                Some(p) => fields.unit_price = Some(p),
                None => warn!(row = row.row_number, value, "Unparseable unit price"),
            },
            FieldKind::Unit => fields.unit = Some(value.to_string()),
            FieldKind::OrderType => fields.order_type = Some(value.to_string()),
            FieldKind::SpecialRequirements => {
                fields.special_requirements = Some(value.to_string())
            }
            FieldKind::Remarks => fields.remarks = Some(value.to_string()),
            FieldKind::SourceOrderId => fields.source_order_id = Some(value.to_string()),
        }
    }

    fields.confidence = Some(fields.key_field_confidence());
    fields
}

/// Integer quantity; tolerates thousands separators and a trailing ".0"
fn parse_quantity(value: &str) -> Option<i64> {
    let cleaned: String = value.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if let Ok(q) = cleaned.parse::<i64>() {
        return (q > 0).then_some(q);
    }
    // Spreadsheet numerics often arrive as "5.0"
    if let Ok(f) = cleaned.parse::<f64>() {
        if f > 0.0 && f.fract() == 0.0 {
            return Some(f as i64);
        }
    }
    None
}

/// Price; tolerates currency symbols and separators
fn parse_price(value: &str) -> Option<f64> {
    let cleaned: String = value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse::<f64>().ok().filter(|p| *p >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(labels: &[&str]) -> BTreeMap<usize, String> {
        labels
            .iter()
            .enumerate()
            .map(|(i, l)| (i, l.to_string()))
            .collect()
    }

    #[test]
    fn rule_mapping_chinese_headers() {
        let headers = headers(&["客户名称", "商品名称", "数量", "单价", "备注"]);
        let mapping = RuleRecognizer::map_headers(&headers);
        assert_eq!(mapping.columns.get(&0), Some(&FieldKind::CustomerName));
        assert_eq!(mapping.columns.get(&1), Some(&FieldKind::ProductName));
        assert_eq!(mapping.columns.get(&2), Some(&FieldKind::Quantity));
        assert_eq!(mapping.columns.get(&3), Some(&FieldKind::UnitPrice));
        assert_eq!(mapping.columns.get(&4), Some(&FieldKind::Remarks));
        assert_eq!(mapping.confidence, 1.0);
    }

    #[test]
    fn rule_mapping_english_headers() {
        let headers = headers(&["Customer", "SKU", "Quantity", "Unit Price"]);
        let mapping = RuleRecognizer::map_headers(&headers);
        assert_eq!(mapping.columns.get(&0), Some(&FieldKind::CustomerName));
        assert_eq!(mapping.columns.get(&1), Some(&FieldKind::ProductSku));
        assert_eq!(mapping.columns.get(&2), Some(&FieldKind::Quantity));
        assert_eq!(mapping.columns.get(&3), Some(&FieldKind::UnitPrice));
    }

    #[test]
    fn tied_keyword_scores_map_consistently() {
        // "数量单价" scores 0.7 for both quantity and unit price; the
        // earlier field in declaration order must win, every time.
        let headers = headers(&["数量单价"]);
        let first = RuleRecognizer::map_headers(&headers);
        assert_eq!(first.columns.get(&0), Some(&FieldKind::Quantity));
        for _ in 0..20 {
            let mapping = RuleRecognizer::map_headers(&headers);
            assert_eq!(mapping.columns.get(&0), first.columns.get(&0));
        }
    }

    #[test]
    fn unmatched_headers_are_skipped() {
        let headers = headers(&["完全无关的列", "数量"]);
        let mapping = RuleRecognizer::map_headers(&headers);
        assert!(!mapping.columns.contains_key(&0));
        assert_eq!(mapping.columns.get(&1), Some(&FieldKind::Quantity));
    }

    #[test]
    fn extract_coerces_numerics() {
        let headers = headers(&["商品编码", "数量", "单价"]);
        let mapping = RuleRecognizer::map_headers(&headers);
        let row = RawRow {
            row_number: 2,
            values: vec!["SKU-1".into(), "1,200".into(), "¥15.50".into()],
            headers: headers.clone(),
        };
        let fields = extract_fields(&row, &mapping);
        assert_eq!(fields.product_sku.as_deref(), Some("SKU-1"));
        assert_eq!(fields.quantity, Some(1200));
        assert_eq!(fields.unit_price, Some(15.5));
    }

    #[test]
    fn extract_leaves_bad_numerics_unset() {
        let headers = headers(&["数量", "单价"]);
        let mapping = RuleRecognizer::map_headers(&headers);
        let row = RawRow {
            row_number: 3,
            values: vec!["abc".into(), "-3".into()],
            headers: headers.clone(),
        };
        let fields = extract_fields(&row, &mapping);
        assert_eq!(fields.quantity, None);
        assert_eq!(fields.unit_price, None);
    }

    #[test]
    fn extract_accepts_float_quantity_without_fraction() {
        let headers = headers(&["数量"]);
        let mapping = RuleRecognizer::map_headers(&headers);
        let row = RawRow {
            row_number: 4,
            values: vec!["5.0".into()],
            headers: headers.clone(),
        };
        assert_eq!(extract_fields(&row, &mapping).quantity, Some(5));
    }

    #[test]
    fn ai_object_coerces_numbers_and_keeps_confidence() {
        let value = serde_json::json!({
            "customer_name": "Acme",
            "quantity": 5,
            "unit_price": "¥10.5",
            "confidence": 0.87,
            "not_a_field": "ignored",
        });
        let fields = fields_from_ai_object(value.as_object().unwrap(), 1);
        assert_eq!(fields.customer_name.as_deref(), Some("Acme"));
        assert_eq!(fields.quantity, Some(5));
        assert_eq!(fields.unit_price, Some(10.5));
        assert_eq!(fields.confidence, Some(0.87));
    }

    #[test]
    fn ai_object_without_confidence_uses_key_field_fraction() {
        let value = serde_json::json!({
            "product_sku": "SKU-1",
            "quantity": "3",
        });
        let fields = fields_from_ai_object(value.as_object().unwrap(), 1);
        assert_eq!(fields.confidence, Some(0.5));
    }

    #[test]
    fn confidence_reflects_key_fields() {
        let headers = headers(&["客户名称", "商品名称", "数量", "单价"]);
        let mapping = RuleRecognizer::map_headers(&headers);
        let row = RawRow {
            row_number: 2,
            values: vec!["Acme".into(), "Widget".into(), "3".into(), "".into()],
            headers: headers.clone(),
        };
        let fields = extract_fields(&row, &mapping);
        assert_eq!(fields.confidence, Some(0.75));
    }
}
