//! Fixed vocabulary tables.
//!
//! Every component that matches against a word list receives it through a
//! [`Vocabulary`] value rather than reading module globals, so a project can
//! swap tables per genre or locale from `storyline.toml`, and tests can run
//! with tiny custom tables.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const STOPWORDS: &[&str] = &[
    "我们", "你们", "他们", "她们", "它们", "这个", "那个", "一种", "已经", "因为", "所以", "如果",
    "但是", "然后", "自己", "不是", "不会", "就是", "还是", "一个", "一些", "可以", "时候", "什么",
    "怎么", "这样", "那样", "起来", "进去", "出来", "一下", "一样", "以及", "并且", "或者",
];

const PLOT_KEYWORDS: &[&str] = &[
    "冲突", "反转", "伏笔", "回收", "真相", "背叛", "联盟", "新角色", "时间线", "回忆", "穿越",
    "死亡", "复活", "势力", "升级", "突破", "决战", "危机", "转折", "悬念",
];

const LIGHT_SCENE_KEYWORDS: &[&str] = &[
    "日常", "过渡", "环境描写", "吃饭", "赶路", "休整", "闲聊", "铺垫",
];

const PLACE_PREPOSITIONS: &[&str] = &[
    "在", "到", "去", "回到", "来到", "抵达", "进入", "离开", "前往", "从", "于",
];

const PLACE_SUFFIXES: &[&str] = &[
    "站", "台", "港", "城", "街", "村", "楼", "馆", "厂", "桥", "学校", "医院",
];

const FORESHADOW_MARKERS: &[&str] = &["伏笔", "线索", "坐标", "代号", "暗号", "名单"];

const CONFLICT_HIGH: &[&str] = &[
    "决战", "追杀", "爆炸", "死亡", "复活", "背叛", "崩塌", "危机", "反转",
];

const CONFLICT_MEDIUM: &[&str] = &[
    "冲突", "对峙", "交锋", "潜入", "调查", "追踪", "怀疑", "联盟",
];

const CONFLICT_LOW: &[&str] = &["日常", "过渡", "闲聊", "铺垫"];

const REGISTRY_NOISE: &[&str] = &[
    "人物", "角色", "姓名", "状态", "当前状态", "关系", "位置", "目标", "变化", "章节",
];

/// Word lists used by tokenization, tagging and trigger classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// CJK n-grams never emitted as tokens.
    pub stopwords: Vec<String>,

    /// Plot-significant terms. Used both as chapter event tags and as the
    /// trigger classifier's plot keywords.
    pub plot_keywords: Vec<String>,

    /// Terms marking a scene that rarely needs prior context.
    pub light_scene_keywords: Vec<String>,

    /// Words that introduce a place ("在", "来到", ...).
    pub place_prepositions: Vec<String>,

    /// Endings that mark a CJK run as a place name ("站", "医院", ...).
    pub place_suffixes: Vec<String>,

    /// Words that open a foreshadowing reference.
    pub foreshadow_markers: Vec<String>,

    /// Conflict vocabulary checked first.
    pub conflict_high: Vec<String>,

    /// Conflict vocabulary checked when nothing high matched.
    pub conflict_medium: Vec<String>,

    /// Conflict vocabulary checked last.
    pub conflict_low: Vec<String>,

    /// Registry cells that look like names but are table headers.
    pub registry_noise: Vec<String>,
}

fn owned(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| (*w).to_string()).collect()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            stopwords: owned(STOPWORDS),
            plot_keywords: owned(PLOT_KEYWORDS),
            light_scene_keywords: owned(LIGHT_SCENE_KEYWORDS),
            place_prepositions: owned(PLACE_PREPOSITIONS),
            place_suffixes: owned(PLACE_SUFFIXES),
            foreshadow_markers: owned(FORESHADOW_MARKERS),
            conflict_high: owned(CONFLICT_HIGH),
            conflict_medium: owned(CONFLICT_MEDIUM),
            conflict_low: owned(CONFLICT_LOW),
            registry_noise: owned(REGISTRY_NOISE),
        }
    }
}

impl Vocabulary {
    /// SHA-256 over every table, in field order.
    ///
    /// Documents tagged under one vocabulary are stale under any other.
    pub fn signature(&self) -> String {
        let tables = [
            &self.stopwords,
            &self.plot_keywords,
            &self.light_scene_keywords,
            &self.place_prepositions,
            &self.place_suffixes,
            &self.foreshadow_markers,
            &self.conflict_high,
            &self.conflict_medium,
            &self.conflict_low,
            &self.registry_noise,
        ];
        let mut hasher = Sha256::new();
        for table in tables {
            for word in table {
                hasher.update(word.as_bytes());
                hasher.update(b"\n");
            }
            hasher.update(b"|");
        }
        format!("{:x}", hasher.finalize())
    }
}
