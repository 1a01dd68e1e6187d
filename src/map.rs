//! Map rendering
//!
//! Produces a self-contained Leaflet page: markers and connectors are
//! serialized to JSON and drawn by a short inline script, the legend is
//! plain HTML. Leaflet itself comes from a CDN.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::{ProcessedRecord, Resolution, RowResult};
use crate::scenario::Scenario;

const DEFAULT_PALETTE: [(u32, &str); 10] = [
    (1, "#4D148C"),
    (2, "#FF6200"),
    (3, "#671CAA"),
    (4, "#7D22C3"),
    (5, "#932DA2"),
    (6, "#A63685"),
    (7, "#B83F6A"),
    (8, "#C74755"),
    (9, "#D87E88"),
    (10, "#C172AA"),
];

pub const DEFAULT_DOT_SIZE: u32 = 2;
const MAP_CENTER: [f64; 2] = [20.0, 0.0];
const MAP_ZOOM: u8 = 2;
const CONNECTOR_WEIGHT: f64 = 0.5;

/// Styling inputs for a render, passed explicitly instead of living in
/// session state
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub palette: BTreeMap<u32, String>,
    pub dot_size: u32,
    pub default_color: String,
    pub warehouse_color: String,
    pub connector_color: String,
    pub origin_color: String,
    pub destination_color: String,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            palette: DEFAULT_PALETTE
                .iter()
                .map(|&(layer, color)| (layer, color.to_string()))
                .collect(),
            dot_size: DEFAULT_DOT_SIZE,
            default_color: "#808080".to_string(),
            warehouse_color: "yellow".to_string(),
            connector_color: "grey".to_string(),
            origin_color: "#4D148C".to_string(),
            destination_color: "#FF6200".to_string(),
        }
    }
}

impl RenderContext {
    #[must_use]
    pub fn with_dot_size(mut self, dot_size: u32) -> Self {
        self.dot_size = dot_size;
        self
    }

    /// Palette key for a category cell; `"3"` and `"3.0"` both map to 3
    fn palette_key(category: &str) -> Option<u32> {
        let value: f64 = category.trim().parse().ok()?;
        (value.fract() == 0.0 && value >= 0.0 && value <= f64::from(u32::MAX))
            .then_some(value as u32)
    }

    /// Colour for a category, falling back to the default colour
    #[must_use]
    pub fn color_for(&self, category: Option<&str>) -> &str {
        category
            .and_then(Self::palette_key)
            .and_then(|key| self.palette.get(&key))
            .map_or(self.default_color.as_str(), String::as_str)
    }

    fn radius(&self) -> f64 {
        f64::from(self.dot_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub lat: f64,
    pub lon: f64,
    pub radius: f64,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Connector {
    pub from: [f64; 2],
    pub to: [f64; 2],
    pub color: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegendEntry {
    pub label: String,
    pub color: String,
}

/// Everything drawn on the map
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MapLayers {
    pub markers: Vec<Marker>,
    pub connectors: Vec<Connector>,
    #[serde(skip)]
    pub legend: Vec<LegendEntry>,
}

impl MapLayers {
    /// South-west and north-east corners covering every marker
    #[must_use]
    pub fn bounds(&self) -> Option<[[f64; 2]; 2]> {
        let first = self.markers.first()?;
        let init = [[first.lat, first.lon], [first.lat, first.lon]];
        Some(self.markers.iter().fold(init, |[sw, ne], m| {
            [
                [sw[0].min(m.lat), sw[1].min(m.lon)],
                [ne[0].max(m.lat), ne[1].max(m.lon)],
            ]
        }))
    }
}

/// Minimal escaping for text placed into HTML
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn point(resolution: &Resolution) -> Option<[f64; 2]> {
    resolution.location().map(|l| l.lat_lon())
}

struct Builder<'a> {
    ctx: &'a RenderContext,
    layers: MapLayers,
    used_layers: BTreeSet<u32>,
}

impl<'a> Builder<'a> {
    fn new(ctx: &'a RenderContext) -> Self {
        Self {
            ctx,
            layers: MapLayers::default(),
            used_layers: BTreeSet::new(),
        }
    }

    fn marker(&mut self, at: [f64; 2], radius: f64, color: &str, tooltip: Option<String>) {
        self.layers.markers.push(Marker {
            lat: at[0],
            lon: at[1],
            radius,
            color: color.to_string(),
            tooltip,
        });
    }

    fn categorized(&mut self, at: [f64; 2], category: Option<&str>, tooltip: Option<String>) {
        let color = self.ctx.color_for(category).to_string();
        if let Some(key) = category
            .and_then(RenderContext::palette_key)
            .filter(|key| self.ctx.palette.contains_key(key))
        {
            self.used_layers.insert(key);
        }
        self.marker(at, self.ctx.radius(), &color, tooltip);
    }

    fn connector(&mut self, from: [f64; 2], to: [f64; 2], tooltip: Option<String>) {
        self.layers.connectors.push(Connector {
            from,
            to,
            color: self.ctx.connector_color.clone(),
            weight: CONNECTOR_WEIGHT,
            tooltip,
        });
    }

    fn add(&mut self, scenario: Scenario, record: &ProcessedRecord) {
        let category = record.category.as_deref();
        match &record.result {
            RowResult::Single { location } => {
                let Some(at) = point(location) else { return };
                let tooltip = match scenario {
                    Scenario::Volume => category.map(|v| format!("Volume: {}", escape_html(v))),
                    _ => None,
                };
                self.categorized(at, category, tooltip);
            }
            RowResult::SupplyChain {
                warehouse,
                destination,
            } => {
                let warehouse = point(warehouse);
                let destination = point(destination);
                if let Some(at) = warehouse {
                    let color = self.ctx.warehouse_color.clone();
                    self.marker(at, self.ctx.radius() * 1.5, &color, None);
                }
                if let Some(at) = destination {
                    self.categorized(at, category, None);
                }
                if let (Some(from), Some(to)) = (warehouse, destination) {
                    self.connector(from, to, None);
                }
            }
            RowResult::Distance {
                origin,
                destination,
                distance_km,
            } => {
                let tooltip = distance_km.map(|km| format!("{km:.1} km"));
                let origin = point(origin);
                let destination = point(destination);
                if let Some(at) = origin {
                    let color = self.ctx.origin_color.clone();
                    self.marker(at, self.ctx.radius(), &color, None);
                }
                if let Some(at) = destination {
                    let color = self.ctx.destination_color.clone();
                    self.marker(at, self.ctx.radius(), &color, tooltip.clone());
                }
                if let (Some(from), Some(to)) = (origin, destination) {
                    self.connector(from, to, tooltip);
                }
            }
        }
    }

    fn finish(mut self, scenario: Scenario) -> MapLayers {
        let mut legend: Vec<LegendEntry> = self
            .used_layers
            .iter()
            .filter_map(|key| {
                self.ctx.palette.get(key).map(|color| LegendEntry {
                    label: match scenario {
                        Scenario::Volume => format!("Volume {key}"),
                        _ => format!("Layer {key}"),
                    },
                    color: color.clone(),
                })
            })
            .collect();

        match scenario {
            Scenario::SupplyChain => legend.push(LegendEntry {
                label: "Warehouse".to_string(),
                color: self.ctx.warehouse_color.clone(),
            }),
            Scenario::Distance => {
                legend.push(LegendEntry {
                    label: "Origin".to_string(),
                    color: self.ctx.origin_color.clone(),
                });
                legend.push(LegendEntry {
                    label: "Destination".to_string(),
                    color: self.ctx.destination_color.clone(),
                });
            }
            Scenario::Standard | Scenario::Volume => {}
        }

        self.layers.legend = legend;
        self.layers
    }
}

/// Collect markers, connectors and legend entries for resolved rows
#[must_use]
pub fn build_layers(
    scenario: Scenario,
    records: &[ProcessedRecord],
    ctx: &RenderContext,
) -> MapLayers {
    let mut builder = Builder::new(ctx);
    for record in records {
        builder.add(scenario, record);
    }
    builder.finish(scenario)
}

/// Legend block, empty when there is nothing to explain
#[must_use]
pub fn legend_html(entries: &[LegendEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut html = String::from("<div class=\"legend\">\n");
    for entry in entries {
        html.push_str(&format!(
            "  <div><span class=\"swatch\" style=\"background:{}\"></span>{}</div>\n",
            escape_html(&entry.color),
            escape_html(&entry.label)
        ));
    }
    html.push_str("</div>\n");
    html
}

#[derive(Serialize)]
struct ScriptData<'a> {
    center: [f64; 2],
    zoom: u8,
    markers: &'a [Marker],
    connectors: &'a [Connector],
    bounds: Option<[[f64; 2]; 2]>,
}

const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>__TITLE__</title>
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>
html, body, #map { height: 100%; margin: 0; }
.legend { position: absolute; bottom: 24px; right: 12px; z-index: 1000; background: #fff; padding: 8px 10px; border-radius: 4px; font: 13px sans-serif; box-shadow: 0 1px 4px rgba(0,0,0,0.3); }
.legend .swatch { display: inline-block; width: 12px; height: 12px; margin-right: 6px; border-radius: 50%; vertical-align: middle; }
</style>
</head>
<body>
<div id="map"></div>
__LEGEND__<script>
const data = __DATA__;
const map = L.map('map').setView(data.center, data.zoom);
L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
  attribution: '&copy; OpenStreetMap contributors'
}).addTo(map);
for (const c of data.connectors) {
  const line = L.polyline([c.from, c.to], { color: c.color, weight: c.weight, opacity: 1 }).addTo(map);
  if (c.tooltip) line.bindTooltip(c.tooltip);
}
for (const m of data.markers) {
  const marker = L.circleMarker([m.lat, m.lon], {
    radius: m.radius, color: m.color, fill: true, fillColor: m.color, fillOpacity: 1
  }).addTo(map);
  if (m.tooltip) marker.bindTooltip(m.tooltip);
}
if (data.bounds) map.fitBounds(data.bounds);
</script>
</body>
</html>
"#;

/// Render prepared layers into a full HTML page
pub fn render_layers(title: &str, layers: &MapLayers) -> Result<String> {
    let data = ScriptData {
        center: MAP_CENTER,
        zoom: MAP_ZOOM,
        markers: &layers.markers,
        connectors: &layers.connectors,
        bounds: layers.bounds(),
    };
    let json = serde_json::to_string(&data)
        .context("Failed to serialize map data")?
        .replace("</", "<\\/");

    Ok(PAGE
        .replace("__TITLE__", &escape_html(title))
        .replace("__LEGEND__", &legend_html(&layers.legend))
        .replace("__DATA__", &json))
}

/// Render a processed batch as a Leaflet page
pub fn render_map(
    scenario: Scenario,
    records: &[ProcessedRecord],
    ctx: &RenderContext,
) -> Result<String> {
    let layers = build_layers(scenario, records, ctx);
    render_layers(scenario.display_name(), &layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResolvedLocation;
    use rstest::rstest;

    fn found(lat: f64, lon: f64) -> Resolution {
        Resolution::Found(ResolvedLocation {
            latitude: lat,
            longitude: lon,
            matched_postal_code: None,
            matched_city: None,
            country_code: "US".to_string(),
        })
    }

    fn single(index: usize, location: Resolution, category: Option<&str>) -> ProcessedRecord {
        ProcessedRecord {
            index,
            cells: Vec::new(),
            category: category.map(str::to_string),
            result: RowResult::Single { location },
        }
    }

    #[rstest]
    #[case(Some("1"), "#4D148C")]
    #[case(Some("2.0"), "#FF6200")]
    #[case(Some(" 10 "), "#C172AA")]
    #[case(Some("11"), "#808080")]
    #[case(Some("2.5"), "#808080")]
    #[case(Some("north"), "#808080")]
    #[case(None, "#808080")]
    fn test_color_lookup(#[case] category: Option<&str>, #[case] expected: &str) {
        assert_eq!(RenderContext::default().color_for(category), expected);
    }

    #[test]
    fn test_standard_markers_skip_unresolved_rows() {
        let records = vec![
            single(0, found(40.0, -74.0), Some("1")),
            single(1, Resolution::NotFound, Some("2")),
            single(2, found(51.5, -0.1), Some("3")),
        ];

        let layers = build_layers(Scenario::Standard, &records, &RenderContext::default());

        assert_eq!(layers.markers.len(), 2);
        assert_eq!(layers.markers[0].color, "#4D148C");
        assert_eq!(layers.markers[0].radius, 2.0);
        assert!(layers.connectors.is_empty());
        let labels: Vec<&str> = layers.legend.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Layer 1", "Layer 3"]);
        assert_eq!(
            layers.bounds(),
            Some([[40.0, -74.0], [51.5, -0.1]])
        );
    }

    #[test]
    fn test_supply_chain_connector_needs_both_ends() {
        let records = vec![
            ProcessedRecord {
                index: 0,
                cells: Vec::new(),
                category: Some("2".to_string()),
                result: RowResult::SupplyChain {
                    warehouse: found(51.0, 13.7),
                    destination: found(48.1, 11.6),
                },
            },
            ProcessedRecord {
                index: 1,
                cells: Vec::new(),
                category: Some("2".to_string()),
                result: RowResult::SupplyChain {
                    warehouse: found(51.0, 13.7),
                    destination: Resolution::NotFound,
                },
            },
        ];
        let ctx = RenderContext::default().with_dot_size(4);

        let layers = build_layers(Scenario::SupplyChain, &records, &ctx);

        assert_eq!(layers.markers.len(), 3);
        assert_eq!(layers.markers[0].color, "yellow");
        assert_eq!(layers.markers[0].radius, 6.0);
        assert_eq!(layers.markers[1].color, "#FF6200");
        assert_eq!(layers.connectors.len(), 1);
        assert_eq!(layers.connectors[0].color, "grey");
        assert_eq!(layers.connectors[0].weight, 0.5);
        assert_eq!(layers.legend.last().unwrap().label, "Warehouse");
    }

    #[test]
    fn test_volume_colours_by_raw_value() {
        let records = vec![
            single(0, found(1.0, 1.0), Some("3")),
            single(1, found(2.0, 2.0), Some("500")),
        ];

        let layers = build_layers(Scenario::Volume, &records, &RenderContext::default());

        assert_eq!(layers.markers[0].color, "#671CAA");
        assert_eq!(layers.markers[1].color, "#808080");
        assert_eq!(layers.markers[1].tooltip.as_deref(), Some("Volume: 500"));
        assert_eq!(layers.legend.len(), 1);
    }

    #[test]
    fn test_distance_tooltip() {
        let records = vec![ProcessedRecord {
            index: 0,
            cells: Vec::new(),
            category: None,
            result: RowResult::Distance {
                origin: found(40.7128, -74.0060),
                destination: found(51.5074, -0.1278),
                distance_km: Some(5570.23),
            },
        }];

        let layers = build_layers(Scenario::Distance, &records, &RenderContext::default());

        assert_eq!(layers.markers.len(), 2);
        assert_eq!(layers.connectors[0].tooltip.as_deref(), Some("5570.2 km"));
    }

    #[test]
    fn test_empty_batch_has_no_bounds() {
        let html = render_map(Scenario::Standard, &[], &RenderContext::default()).unwrap();
        assert!(html.contains("\"bounds\":null"));
        assert!(html.contains("\"center\":[20.0,0.0]"));
        assert!(!html.contains("class=\"legend\""));
    }

    #[test]
    fn test_render_escapes_user_text() {
        let records = vec![single(0, found(1.0, 2.0), Some("<script>alert(1)</script>"))];

        let html = render_map(Scenario::Volume, &records, &RenderContext::default()).unwrap();

        assert!(html.contains("Volume: &lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(!html.contains("<script>alert(1)"));
        assert!(html.contains("<title>Volume visualization</title>"));
        assert!(html.contains("leaflet.js"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"a & b < "c" > 'd'"#),
            "a &amp; b &lt; &quot;c&quot; &gt; &#39;d&#39;"
        );
    }
}
