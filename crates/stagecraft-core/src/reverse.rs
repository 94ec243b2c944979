//! Dockerfile → specification.
//!
//! Every `FROM` opens a stage. The instructions up to the next `FROM` become
//! that stage's template, kept verbatim so that compiling the generated
//! specification reproduces them.

use crate::diagnostics::{Diagnostics, Event};
use crate::error::Error;
use crate::model::Instruction;
use crate::parser::parse_instructions;
use crate::spec::{
    BaseImage, BuildStep, BuildTemplateStep, DockerStep, Metadata, Specification, Stage, Template,
};

const HEADER: &str = "\
# Generated from a Dockerfile by stagecraft.
# Base images are split as image[:platform][:tag]: the second ':' segment is
# recorded as the platform and the third as the tag.
";

/// Reverse-compiles `input` into a specification document for `image:tag`.
pub fn reverse(
    input: &str,
    image: &str,
    tag: &str,
    diagnostics: &dyn Diagnostics,
) -> Result<String, Error> {
    let instructions = parse_instructions(input)?;
    let spec = reconstruct(&instructions, image, tag, diagnostics)?;
    Ok(format!("{HEADER}{}", spec.to_yaml()?))
}

/// Groups parsed instructions into one build step with a stage and template per `FROM`.
pub fn reconstruct(
    instructions: &[Instruction],
    image: &str,
    tag: &str,
    diagnostics: &dyn Diagnostics,
) -> Result<Specification, Error> {
    let first_from = instructions
        .iter()
        .position(Instruction::is_from)
        .ok_or_else(|| Error::invalid_spec("build file has no FROM instruction"))?;

    for skipped in &instructions[..first_from] {
        diagnostics.emit(Event::Warning {
            line: Some(skipped.start_line),
            message: "instruction before the first FROM cannot be placed in a stage; skipped",
        });
    }

    let mut stages = Vec::new();
    let mut templates = Vec::new();
    for (ordinal, segment) in segments(&instructions[first_from..]).into_iter().enumerate() {
        let (stage, template) = rebuild_stage(segment, ordinal + 1, diagnostics)?;
        stages.push(stage);
        templates.extend(template);
    }

    let tag = if tag.is_empty() {
        image.to_string()
    } else {
        format!("{image}:{tag}")
    };

    Ok(Specification {
        steps: vec![BuildStep {
            metadata: Metadata {
                name: Some(image.to_string()),
                ..Metadata::default()
            },
            stages,
            tag,
            ..BuildStep::default()
        }],
        templates,
    })
}

/// Slices starting at each `FROM`.
fn segments(instructions: &[Instruction]) -> Vec<&[Instruction]> {
    let mut starts: Vec<usize> = instructions
        .iter()
        .enumerate()
        .filter_map(|(index, instruction)| instruction.is_from().then_some(index))
        .collect();
    starts.push(instructions.len());

    starts
        .windows(2)
        .map(|bounds| &instructions[bounds[0]..bounds[1]])
        .collect()
}

fn rebuild_stage(
    segment: &[Instruction],
    ordinal: usize,
    diagnostics: &dyn Diagnostics,
) -> Result<(Stage, Option<Template>), Error> {
    let Some((from, body)) = segment.split_first() else {
        return Err(Error::invalid_spec("empty stage segment"));
    };

    let reference = from.value.first().ok_or_else(|| {
        Error::malformed_instruction(Some(from.start_line), "FROM requires an image")
    })?;
    let alias = match from.value.as_slice() {
        [_, keyword, alias, ..] if keyword.eq_ignore_ascii_case("as") => Some(alias.clone()),
        _ => None,
    };
    if !from.flags.is_empty() {
        diagnostics.emit(Event::Warning {
            line: Some(from.start_line),
            message: "FROM flags have no specification field; dropped",
        });
    }

    let template = (!body.is_empty()).then(|| Template {
        name: alias
            .clone()
            .unwrap_or_else(|| format!("build-template-{ordinal}")),
        steps: vec![BuildTemplateStep::Docker(DockerStep::Inline(
            body.iter()
                .map(|instruction| instruction.original.clone())
                .collect(),
        ))],
    });

    let stage = Stage {
        metadata: Metadata {
            name: alias,
            ..Metadata::default()
        },
        base: split_reference(reference),
        template: template.as_ref().map(|template| template.name.clone()),
        cmd: Vec::new(),
    };

    Ok((stage, template))
}

/// Splits `image[:platform][:tag]`.
///
/// Registry `host:port/` prefixes and `@digest` references stay in `image`.
pub fn split_reference(reference: &str) -> BaseImage {
    if reference.contains('@') {
        return BaseImage {
            image: reference.to_string(),
            ..BaseImage::default()
        };
    }

    let name_start = reference.rfind('/').map_or(0, |slash| slash + 1);
    let (prefix, name) = reference.split_at(name_start);
    let mut parts = name.splitn(3, ':');
    let image = format!("{prefix}{}", parts.next().unwrap_or_default());
    let platform = parts.next().map(str::to_string);
    let tag = parts.next().map(str::to_string);

    BaseImage {
        image,
        platform,
        tag,
    }
}
