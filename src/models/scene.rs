use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneCategory {
    Outdoor,
    Print,
    Transport,
    Digital,
    Retail,
    Street,
    Sports,
    Entertainment,
}

impl SceneCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SceneCategory::Outdoor => "outdoor",
            SceneCategory::Print => "print",
            SceneCategory::Transport => "transport",
            SceneCategory::Digital => "digital",
            SceneCategory::Retail => "retail",
            SceneCategory::Street => "street",
            SceneCategory::Sports => "sports",
            SceneCategory::Entertainment => "entertainment",
        }
    }
}

/// One advertisement placement context the product can be composed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SceneFormat {
    pub id: &'static str,
    pub name: &'static str,
    pub category: SceneCategory,
    pub prompt_text: &'static str,
}

impl SceneFormat {
    /// Caption used when listing scenes, e.g. `vintage poster`.
    pub fn label(&self) -> String {
        self.id.replace('_', " ")
    }
}

/// Built-in scenes, in display order.
pub const SCENE_FORMATS: [SceneFormat; 10] = [
    SceneFormat {
        id: "billboard",
        name: "City Billboard",
        category: SceneCategory::Outdoor,
        prompt_text: "A massive billboard in a bustling city center like Times Square.",
    },
    SceneFormat {
        id: "magazine",
        name: "Magazine Ad",
        category: SceneCategory::Print,
        prompt_text: "A full-page color advertisement in a glossy fashion magazine.",
    },
    SceneFormat {
        id: "bus",
        name: "Bus Ad",
        category: SceneCategory::Transport,
        prompt_text: "An ad on the side of a classic red double-decker bus in London.",
    },
    SceneFormat {
        id: "airport",
        name: "Airport Screen",
        category: SceneCategory::Digital,
        prompt_text: "A digital screen ad at a futuristic airport terminal.",
    },
    SceneFormat {
        id: "coffeeshop",
        name: "Coffee Shop Sign",
        category: SceneCategory::Retail,
        prompt_text: "A rustic wooden sign outside a cozy coffee shop on a cobblestone street.",
    },
    SceneFormat {
        id: "social",
        name: "Social Media",
        category: SceneCategory::Digital,
        prompt_text: "A social media sponsored post on a popular influencer's feed.",
    },
    SceneFormat {
        id: "vintage_poster",
        name: "Vintage Poster",
        category: SceneCategory::Street,
        prompt_text: "A vintage-style poster on a brick wall in a trendy alleyway.",
    },
    SceneFormat {
        id: "jumbotron",
        name: "Stadium Jumbotron",
        category: SceneCategory::Sports,
        prompt_text: "An advertisement on a jumbotron screen at a packed sports stadium.",
    },
    SceneFormat {
        id: "movie_placement",
        name: "Movie Placement",
        category: SceneCategory::Entertainment,
        prompt_text: "A product placement on a table in a scene from a high-budget movie.",
    },
    SceneFormat {
        id: "airplane_ad",
        name: "Airplane Seat Ad",
        category: SceneCategory::Transport,
        prompt_text: "An ad on the back of a seat on a commercial airplane.",
    },
];

pub fn scene_catalog() -> &'static [SceneFormat] {
    &SCENE_FORMATS
}

pub fn find_scene(id: &str) -> Option<&'static SceneFormat> {
    SCENE_FORMATS.iter().find(|scene| scene.id == id)
}
