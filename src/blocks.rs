//! Palette metadata for both extensions.
//!
//! The structures serialize to the JSON shape block hosts expect from `getInfo()`.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::canvas::style::CompositeMode;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Command,
    Reporter,
    Button,
    Label,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    Number,
    String,
    Color,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentInfo {
    #[serde(rename = "type")]
    pub kind: ArgumentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opcode: Option<String>,
    pub block_type: BlockType,
    pub text: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub arguments: BTreeMap<String, ArgumentInfo>,
    /// Button callback name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hide_from_palette: bool,
}

impl BlockInfo {
    fn new(block_type: BlockType, opcode: Option<&str>, text: &str) -> Self {
        Self {
            opcode: opcode.map(str::to_string),
            block_type,
            text: text.to_string(),
            arguments: BTreeMap::new(),
            func: None,
            hide_from_palette: false,
        }
    }

    pub fn command(opcode: &str, text: &str) -> Self {
        Self::new(BlockType::Command, Some(opcode), text)
    }

    pub fn reporter(opcode: &str, text: &str) -> Self {
        Self::new(BlockType::Reporter, Some(opcode), text)
    }

    pub fn label(text: &str) -> Self {
        Self::new(BlockType::Label, None, text)
    }

    pub fn button(func: &str, text: &str) -> Self {
        Self {
            func: Some(func.to_string()),
            ..Self::new(BlockType::Button, None, text)
        }
    }

    fn arg(mut self, name: &str, info: ArgumentInfo) -> Self {
        self.arguments.insert(name.to_string(), info);
        self
    }

    fn num(self, name: &str, default: &str) -> Self {
        self.arg(
            name,
            ArgumentInfo {
                kind: ArgumentType::Number,
                default_value: Some(default.to_string()),
                menu: None,
            },
        )
    }

    fn string(self, name: &str, default: &str) -> Self {
        self.arg(
            name,
            ArgumentInfo {
                kind: ArgumentType::String,
                default_value: Some(default.to_string()),
                menu: None,
            },
        )
    }

    fn color(self, name: &str, default: &str) -> Self {
        self.arg(
            name,
            ArgumentInfo {
                kind: ArgumentType::Color,
                default_value: Some(default.to_string()),
                menu: None,
            },
        )
    }

    fn menu(self, name: &str, menu: &str) -> Self {
        self.arg(
            name,
            ArgumentInfo {
                kind: ArgumentType::String,
                default_value: None,
                menu: Some(menu.to_string()),
            },
        )
    }

    fn hidden(mut self) -> Self {
        self.hide_from_palette = true;
        self
    }

    /// Argument names in template order.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut rest = self.text.as_str();
        while let Some(start) = rest.find('[') {
            let Some(len) = rest[start..].find(']') else {
                break;
            };
            out.push(&rest[start + 1..start + len]);
            rest = &rest[start + len + 1..];
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub text: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuInfo {
    pub items: Vec<MenuItem>,
    pub accept_reporters: bool,
}

impl MenuInfo {
    fn labeled(items: &[(&str, &str)]) -> Self {
        Self {
            items: items
                .iter()
                .map(|(text, value)| MenuItem {
                    text: text.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            accept_reporters: true,
        }
    }

    fn plain(values: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            items: values
                .into_iter()
                .map(|v| MenuItem {
                    text: v.to_string(),
                    value: v.to_string(),
                })
                .collect(),
            accept_reporters: true,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "docsURI", skip_serializing_if = "Option::is_none")]
    pub docs_uri: Option<String>,
    pub blocks: Vec<BlockInfo>,
    pub menus: BTreeMap<String, MenuInfo>,
}

impl ExtensionInfo {
    pub fn block(&self, opcode: &str) -> Option<&BlockInfo> {
        self.blocks
            .iter()
            .find(|b| b.opcode.as_deref() == Some(opcode))
    }

    pub fn opcodes(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|b| b.opcode.as_deref())
    }
}

pub const RECANVAS_ID: &str = "DJYReCanvas";
pub const EFFECTS_ID: &str = "DJYStageEffects";

/// Metadata of the canvas extension.
pub fn recanvas_info() -> ExtensionInfo {
    let blocks = vec![
        BlockInfo::button("openAboutAlert", "About"),
        BlockInfo::label("Basics"),
        BlockInfo::command("enableCanvas", "enable canvas"),
        BlockInfo::command("disableCanvas", "disable canvas"),
        BlockInfo::command(
            "setCanvasSize",
            "clear and set canvas width [width] scale [scaleWidth] height [height] scale [scaleHeight]",
        )
        .num("width", "480")
        .num("height", "360")
        .num("scaleWidth", "1")
        .num("scaleHeight", "1"),
        BlockInfo::label("Rectangles"),
        rect_block("fillRect", "fill rect"),
        rect_block("strokeRect", "stroke rect"),
        rect_block("clearRect", "clear rect"),
        BlockInfo::label("Text"),
        BlockInfo::command("fillText", "fill text [text] x [x] y [y]")
            .string("text", "text")
            .num("x", "0")
            .num("y", "100"),
        BlockInfo::command("strokeText", "stroke text [text] x [x] y [y]")
            .string("text", "text")
            .num("x", "0")
            .num("y", "100"),
        BlockInfo::reporter("measureText", "width of [text]").string("text", "text"),
        BlockInfo::label("Images"),
        BlockInfo::command("loadImageAs", "load image name [name] url [url]")
            .string("name", "name")
            .string("url", "https://extensions.turbowarp.org/dango.png"),
        BlockInfo::command("loadImageAsWait", "load image and wait name [name] url [url]")
            .string("name", "name")
            .string("url", "https://extensions.turbowarp.org/dango.png"),
        BlockInfo::command("drawImage", "draw image [name] x [x] y [y]")
            .string("name", "name")
            .num("x", "0")
            .num("y", "0"),
        BlockInfo::label("Paths"),
        BlockInfo::command("fill", "fill"),
        BlockInfo::command("stroke", "stroke"),
        BlockInfo::command("clip", "clip"),
        BlockInfo::command("beginPath", "begin path"),
        BlockInfo::command("closePath", "close path"),
        BlockInfo::command("moveTo", "move to x [x] y [y]")
            .num("x", "0")
            .num("y", "0"),
        BlockInfo::command("lineTo", "line to x [x] y [y]")
            .num("x", "0")
            .num("y", "0"),
        BlockInfo::command("rect", "rect x [x] y [y] width [width] height [height]")
            .num("x", "0")
            .num("y", "0")
            .num("width", "240")
            .num("height", "180"),
        BlockInfo::command(
            "roundRect",
            "round rect x [x] y [y] width [width] height [height] radius [radius]",
        )
        .num("x", "100")
        .num("y", "100")
        .num("width", "200")
        .num("height", "200")
        .num("radius", "10"),
        BlockInfo::command(
            "arc",
            "arc x [x] y [y] radius [r] from [sAngle] rad to [eAngle] rad [anticlockwise]",
        )
        .num("x", "100")
        .num("y", "75")
        .num("r", "50")
        .num("sAngle", "0")
        .num("eAngle", "3.142")
        .menu("anticlockwise", "anticlockwise"),
        BlockInfo::command("arcTo", "arc to x1 [x1] y1 [y1] x2 [x2] y2 [y2] radius [r]")
            .num("x1", "100")
            .num("y1", "20")
            .num("x2", "100")
            .num("y2", "70")
            .num("r", "50"),
        BlockInfo::command(
            "ellipse",
            "ellipse x [x] y [y] radius x [radiusX] radius y [radiusY] rotation [rotation] rad from [sAngle] rad to [eAngle] rad [anticlockwise]",
        )
        .num("x", "100")
        .num("y", "100")
        .num("radiusX", "80")
        .num("radiusY", "40")
        .num("rotation", "0")
        .num("sAngle", "0")
        .num("eAngle", "6.283")
        .menu("anticlockwise", "anticlockwise"),
        BlockInfo::command(
            "bezierCurveTo",
            "bezier curve control cp1x [cp1x] cp1y [cp1y] cp2x [cp2x] cp2y [cp2y] to x [x] y [y]",
        )
        .num("cp1x", "10")
        .num("cp1y", "50")
        .num("cp2x", "100")
        .num("cp2y", "50")
        .num("x", "100")
        .num("y", "10"),
        BlockInfo::label("Transforms"),
        BlockInfo::command("scale", "scale width [width] height [height]")
            .num("width", "2")
            .num("height", "2"),
        BlockInfo::command("rotate", "rotate [angle] rad").num("angle", "0.524"),
        BlockInfo::command("translate", "translate x [x] y [y]")
            .num("x", "30")
            .num("y", "10"),
        BlockInfo::command("transform", "transform [a] [b] [c] [d] [e] [f]")
            .num("a", "1")
            .num("b", "0.5")
            .num("c", "-0.5")
            .num("d", "1")
            .num("e", "30")
            .num("f", "10"),
        BlockInfo::command("resetTransform", "reset transform"),
        BlockInfo::label("Styles"),
        BlockInfo::command("fillStyle", "fill color [color]").color("color", "#66CCFF"),
        BlockInfo::command("strokeStyle", "stroke color [color]").color("color", "#39C5BB"),
        BlockInfo::command("lineWidth", "line width [width]").num("width", "10"),
        BlockInfo::command("lineCap", "line cap [style]").menu("style", "lineCap"),
        BlockInfo::command("lineJoin", "line join [style]").menu("style", "lineJoin"),
        BlockInfo::command("setLineDash", "line dash [array]").string("array", "[10,5]"),
        BlockInfo::command("font", "font [style]").string("style", "50px arial"),
        BlockInfo::label("Compositing"),
        BlockInfo::command("globalAlpha", "global alpha [alpha]").num("alpha", "0.5"),
        BlockInfo::command("globalCompositeOperation", "composite mode [attribute]")
            .menu("attribute", "globalCompositeOperation"),
        BlockInfo::label("State"),
        BlockInfo::command("save", "save canvas state"),
        BlockInfo::command("restore", "restore canvas state"),
        BlockInfo::label("Debug"),
        BlockInfo::reporter("getDescrepency", "stage [dimension] scale factor")
            .menu("dimension", "dimensions"),
        BlockInfo::command("setCanvasImageSmoothing", "[options] canvas smoothing")
            .menu("options", "options"),
        BlockInfo::command("imageSmoothingEnabled", "[options] scaled image smoothing")
            .menu("options", "options"),
        BlockInfo::reporter("getImageData", "getImageData").hidden(),
    ];

    let menus = BTreeMap::from([
        (
            "lineCap".to_string(),
            MenuInfo::labeled(&[("butt", "butt"), ("round", "round"), ("square", "square")]),
        ),
        (
            "lineJoin".to_string(),
            MenuInfo::labeled(&[("miter", "miter"), ("round", "round"), ("bevel", "bevel")]),
        ),
        (
            "anticlockwise".to_string(),
            MenuInfo::labeled(&[("clockwise", "false"), ("anticlockwise", "true")]),
        ),
        (
            "globalCompositeOperation".to_string(),
            MenuInfo::plain(CompositeMode::ALL.iter().map(|m| m.as_str())),
        ),
        (
            "dimensions".to_string(),
            MenuInfo::labeled(&[("width", "width"), ("height", "height")]),
        ),
        (
            "options".to_string(),
            MenuInfo::labeled(&[("enabled", "true"), ("disabled", "false")]),
        ),
    ]);

    ExtensionInfo {
        id: RECANVAS_ID.to_string(),
        name: "Re:Canvas".to_string(),
        docs_uri: Some("https://destrainjury.wuaze.com/50/".to_string()),
        blocks,
        menus,
    }
}

fn rect_block(opcode: &str, verb: &str) -> BlockInfo {
    BlockInfo::command(
        opcode,
        &format!("{verb} x [x] y [y] width [width] height [height]"),
    )
    .num("x", "0")
    .num("y", "0")
    .num("width", "240")
    .num("height", "180")
}

/// Metadata of the stage effects extension.
pub fn effects_info() -> ExtensionInfo {
    let blocks = vec![
        BlockInfo::command(
            "startWave",
            "start wave strength [strength] frequency [frequency] speed [speed]",
        )
        .num("strength", "10")
        .num("frequency", "0.05")
        .num("speed", "0.1"),
        BlockInfo::command("stopWave", "stop wave"),
        BlockInfo::command("channelSplit", "split color channels by [strength]")
            .num("strength", "5"),
        BlockInfo::command("glitch", "glitch [frequency] blocks").num("frequency", "8"),
    ];
    ExtensionInfo {
        id: EFFECTS_ID.to_string(),
        name: "Stage Effects".to_string(),
        docs_uri: None,
        blocks,
        menus: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_placeholder_has_an_argument() {
        for info in [recanvas_info(), effects_info()] {
            for block in &info.blocks {
                for name in block.placeholders() {
                    assert!(
                        block.arguments.contains_key(name),
                        "{:?} is missing argument {name}",
                        block.opcode
                    );
                }
                assert_eq!(block.placeholders().len(), block.arguments.len());
            }
        }
    }

    #[test]
    fn menu_arguments_reference_declared_menus() {
        let info = recanvas_info();
        for block in &info.blocks {
            for arg in block.arguments.values() {
                if let Some(menu) = &arg.menu {
                    assert!(info.menus.contains_key(menu), "unknown menu {menu}");
                }
            }
        }
        assert_eq!(info.menus["globalCompositeOperation"].items.len(), 26);
    }

    #[test]
    fn opcodes_are_unique() {
        let info = recanvas_info();
        let mut seen = std::collections::HashSet::new();
        for op in info.opcodes() {
            assert!(seen.insert(op), "duplicate opcode {op}");
        }
        assert!(info.block("getImageData").unwrap().hide_from_palette);
    }

    #[test]
    fn serializes_in_host_shape() {
        let json = serde_json::to_value(recanvas_info()).unwrap();
        assert_eq!(json["id"], "DJYReCanvas");
        assert_eq!(json["docsURI"], "https://destrainjury.wuaze.com/50/");
        let fill_style = json["blocks"]
            .as_array()
            .unwrap()
            .iter()
            .find(|b| b["opcode"] == "fillStyle")
            .unwrap();
        assert_eq!(fill_style["blockType"], "command");
        assert_eq!(fill_style["arguments"]["color"]["type"], "color");
        assert_eq!(fill_style["arguments"]["color"]["defaultValue"], "#66CCFF");
        assert!(fill_style.get("hideFromPalette").is_none());
        assert_eq!(json["menus"]["options"]["acceptReporters"], true);
    }
}
