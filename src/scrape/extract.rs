use crate::constants::BOILERPLATE_PHRASES;
use crate::types::RawLocation;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

/// One way of pulling raw location mentions out of a page snapshot. The page
/// structure is an unstable external contract, so extraction runs as an
/// ordered chain of strategies and the first non-empty result wins.
pub trait ExtractStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, html: &str) -> Vec<RawLocation>;
}

/// Strategies in priority order.
pub fn strategy_chain() -> Vec<Box<dyn ExtractStrategy>> {
    vec![
        Box::new(DomCardExtractor),
        Box::new(EmbeddedJsonExtractor),
        Box::new(HeuristicTextExtractor),
    ]
}

/// Runs the chain; returns the winning list and the strategy that produced it.
pub fn extract_locations(html: &str) -> (Vec<RawLocation>, &'static str) {
    for strategy in strategy_chain() {
        let found = strategy.extract(html);
        if !found.is_empty() {
            return (found, strategy.name());
        }
    }
    (Vec::new(), "none")
}

static CARD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "[data-testid=\"sub-section-flmg_locations\"] li.ipc-metadata-list__item, \
         li[data-testid=\"list-item\"]",
    )
    .unwrap()
});
static PLACE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.ipc-metadata-list-item__label").unwrap());
static SCENE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(
        "[data-testid=\"item-attributes\"], \
         .ipc-metadata-list-item__list-content-item--subText",
    )
    .unwrap()
});

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Structured location cards. Most reliable shape; the only one that carries
/// scene text, which lives in a sibling attribute element, usually wrapped
/// in parentheses.
pub struct DomCardExtractor;

impl ExtractStrategy for DomCardExtractor {
    fn name(&self) -> &'static str {
        "dom_cards"
    }

    fn extract(&self, html: &str) -> Vec<RawLocation> {
        let document = Html::parse_document(html);
        let mut locations = Vec::new();

        for card in document.select(&CARD_SELECTOR) {
            let Some(place_el) = card.select(&PLACE_SELECTOR).next() else {
                continue;
            };
            let place = collapse_whitespace(&place_el.text().collect::<String>());
            if place.is_empty() {
                continue;
            }

            let scene = card.select(&SCENE_SELECTOR).next().map(|el| {
                let text = collapse_whitespace(&el.text().collect::<String>());
                text.trim_start_matches('(').trim_end_matches(')').to_string()
            });

            locations.push(RawLocation {
                place,
                scene: scene.filter(|s| !s.is_empty()),
            });
        }

        locations
    }
}

static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script#__NEXT_DATA__, script[type=\"application/json\"]").unwrap()
});

/// Known nesting of the embedded page-data JSON down to the filming
/// locations connection.
const EDGE_POINTERS: &[&str] = &[
    "/props/pageProps/contentData/data/title/filmingLocations/edges",
    "/props/pageProps/mainColumnData/filmingLocations/edges",
];

/// Embedded structured data in script tags. Scene text is not present in
/// this shape.
pub struct EmbeddedJsonExtractor;

impl ExtractStrategy for EmbeddedJsonExtractor {
    fn name(&self) -> &'static str {
        "embedded_json"
    }

    fn extract(&self, html: &str) -> Vec<RawLocation> {
        let document = Html::parse_document(html);
        let mut locations = Vec::new();

        for script in document.select(&SCRIPT_SELECTOR) {
            let raw = script.text().collect::<String>();
            let Ok(data) = serde_json::from_str::<Value>(&raw) else {
                continue;
            };
            for pointer in EDGE_POINTERS {
                let Some(edges) = data.pointer(*pointer).and_then(Value::as_array) else {
                    continue;
                };
                for edge in edges {
                    if let Some(text) = edge.pointer("/node/text").and_then(Value::as_str) {
                        let place = collapse_whitespace(text);
                        if !place.is_empty() {
                            locations.push(RawLocation { place, scene: None });
                        }
                    }
                }
                if !locations.is_empty() {
                    return locations;
                }
            }
        }

        locations
    }
}

static SECTION_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("section, div[id]").unwrap());
static LIST_ITEM_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("li").unwrap());
// Pagination counters like "25 of 212"
static COUNTER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\s+of\s+\d+$").unwrap());

/// Last resort: list items inside sections that talk about filming
/// locations, minus known navigation/boilerplate noise.
pub struct HeuristicTextExtractor;

impl ExtractStrategy for HeuristicTextExtractor {
    fn name(&self) -> &'static str {
        "heuristic_text"
    }

    fn extract(&self, html: &str) -> Vec<RawLocation> {
        let document = Html::parse_document(html);
        let mut locations = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for section in document.select(&SECTION_SELECTOR) {
            let section_text = section.text().collect::<String>().to_lowercase();
            if !section_text.contains("filming") && !section_text.contains("location") {
                continue;
            }

            for item in section.select(&LIST_ITEM_SELECTOR) {
                let text = collapse_whitespace(&item.text().collect::<String>());
                if !looks_like_place(&text) {
                    continue;
                }
                if seen.insert(text.clone()) {
                    locations.push(RawLocation {
                        place: text,
                        scene: None,
                    });
                }
            }
        }

        locations
    }
}

fn looks_like_place(text: &str) -> bool {
    if text.len() < 3 || text.len() > 160 {
        return false;
    }
    if !text.chars().any(|c| c.is_alphabetic()) {
        return false;
    }
    if COUNTER_RE.is_match(text) {
        return false;
    }
    let lowered = text.to_lowercase();
    !BOILERPLATE_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD_HTML: &str = r#"
        <div data-testid="sub-section-flmg_locations">
          <ul>
            <li class="ipc-metadata-list__item">
              <a class="ipc-metadata-list-item__label" href="/search">Tower Bridge, London, England, UK</a>
              <span data-testid="item-attributes">(opening chase scene)</span>
            </li>
            <li class="ipc-metadata-list__item">
              <a class="ipc-metadata-list-item__label" href="/search">Reykjavik, Iceland</a>
            </li>
          </ul>
        </div>
    "#;

    #[test]
    fn test_dom_cards_capture_place_and_scene() {
        let found = DomCardExtractor.extract(CARD_HTML);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].place, "Tower Bridge, London, England, UK");
        assert_eq!(found[0].scene.as_deref(), Some("opening chase scene"));
        assert_eq!(found[1].place, "Reykjavik, Iceland");
        assert!(found[1].scene.is_none());
    }

    #[test]
    fn test_embedded_json_navigates_known_shape() {
        let html = r#"
            <script id="__NEXT_DATA__" type="application/json">
            {"props":{"pageProps":{"contentData":{"data":{"title":{"filmingLocations":
              {"edges":[
                {"node":{"text":"Hobbiton, Matamata, New Zealand"}},
                {"node":{"text":"Wellington, New Zealand"}}
              ]}}}}}}}
            </script>
        "#;
        let found = EmbeddedJsonExtractor.extract(html);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].place, "Hobbiton, Matamata, New Zealand");
        assert!(found[0].scene.is_none());
    }

    #[test]
    fn test_heuristic_filters_boilerplate() {
        let html = r#"
            <section>
              <h2>Filming locations</h2>
              <ul>
                <li>Monument Valley, Utah, USA</li>
                <li>See more</li>
                <li>12 of 48</li>
                <li>Back to top</li>
              </ul>
            </section>
            <section>
              <h2>Cast</h2>
              <ul><li>Somebody Famous</li></ul>
            </section>
        "#;
        let found = HeuristicTextExtractor.extract(html);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].place, "Monument Valley, Utah, USA");
    }

    #[test]
    fn test_chain_prefers_dom_cards() {
        let html = format!(
            r#"{CARD_HTML}
            <script id="__NEXT_DATA__" type="application/json">
            {{"props":{{"pageProps":{{"contentData":{{"data":{{"title":{{"filmingLocations":
              {{"edges":[{{"node":{{"text":"Somewhere Else"}}}}]}}}}}}}}}}}}}}
            </script>"#
        );
        let (found, strategy) = extract_locations(&html);
        assert_eq!(strategy, "dom_cards");
        assert_eq!(found[0].place, "Tower Bridge, London, England, UK");
    }

    #[test]
    fn test_chain_falls_through_to_empty() {
        let (found, strategy) = extract_locations("<html><body><p>nothing here</p></body></html>");
        assert!(found.is_empty());
        assert_eq!(strategy, "none");
    }
}
