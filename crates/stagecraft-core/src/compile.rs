use std::io::Write;
use std::path::{Path, PathBuf};

use crate::context::{BuildContext, RemoteFetch};
use crate::diagnostics::{Diagnostics, Event};
use crate::error::Error;
use crate::model::Instruction;
use crate::resolve::Resolver;
use crate::spec::{BuildStep, Specification};

/// Renders every stage of `step` into one build file's text.
pub fn render(
    step: &BuildStep,
    resolver: &Resolver<'_>,
    diagnostics: &dyn Diagnostics,
) -> Result<String, Error> {
    if step.stages.is_empty() {
        return Err(Error::invalid_spec(format!(
            "build step `{}` has no stages",
            step.display_name()
        )));
    }

    let mut instructions = Vec::new();
    for stage in &step.stages {
        let resolved = resolver.resolve(stage)?;
        diagnostics.emit(Event::StageResolved {
            stage: stage.display_name(),
            instructions: &resolved,
        });
        instructions.extend(resolved);
    }

    Ok(render_instructions(&instructions))
}

/// One instruction per line; every `FROM` after the first gets one blank line before it.
pub fn render_instructions(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for (index, instruction) in instructions.iter().enumerate() {
        if index > 0 && instruction.is_from() {
            out.push('\n');
        }
        out.push_str(&instruction.render());
        out.push('\n');
    }
    out
}

/// Writes `text` to a new, uniquely named `Dockerfile.*` inside `dir`.
pub fn write_build_file(text: &str, dir: &Path) -> Result<PathBuf, Error> {
    let mut file = tempfile::Builder::new()
        .prefix("Dockerfile.")
        .tempfile_in(dir)?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    file.into_temp_path()
        .keep()
        .map_err(|err| Error::io(err.error))
}

/// Compiles every build step, returning one build file path per step.
///
/// When a step fails, files written for earlier steps are removed before the
/// error is returned.
pub fn compile_all(
    spec: &Specification,
    context: &dyn BuildContext,
    fetcher: &dyn RemoteFetch,
    diagnostics: &dyn Diagnostics,
) -> Result<Vec<PathBuf>, Error> {
    let context_dir = context.read()?;
    let resolver = Resolver::new(&spec.templates, &context_dir, fetcher);

    let mut written = Vec::with_capacity(spec.steps.len());
    for step in &spec.steps {
        match compile_step(step, &resolver, diagnostics) {
            Ok(path) => written.push(path),
            Err(err) => {
                remove_written(&written, diagnostics);
                return Err(err);
            }
        }
    }

    Ok(written)
}

fn compile_step(
    step: &BuildStep,
    resolver: &Resolver<'_>,
    diagnostics: &dyn Diagnostics,
) -> Result<PathBuf, Error> {
    let text = render(step, resolver, diagnostics)?;
    let path = write_build_file(&text, resolver.context_dir())?;
    diagnostics.emit(Event::BuildFileWritten {
        step: step.display_name(),
        path: &path,
    });
    Ok(path)
}

fn remove_written(paths: &[PathBuf], diagnostics: &dyn Diagnostics) {
    for path in paths {
        if let Err(error) = std::fs::remove_file(path) {
            diagnostics.emit(Event::CleanupFailed {
                path,
                error: &error,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::compile::{compile_all, render, render_instructions};
    use crate::context::{LocalContext, NoRemoteFetch};
    use crate::diagnostics::{NoopDiagnostics, RecordingDiagnostics};
    use crate::error::Error;
    use crate::model::Instruction;
    use crate::resolve::Resolver;
    use crate::spec::{
        BaseImage, BuildStep, BuildTemplateStep, DockerStep, Metadata, Specification, Stage,
    };

    fn inline_stage(name: &str, image: &str, lines: &[&str]) -> Stage {
        Stage {
            metadata: Metadata {
                name: Some(name.to_string()),
                ..Metadata::default()
            },
            base: BaseImage {
                image: image.to_string(),
                ..BaseImage::default()
            },
            template: None,
            cmd: vec![BuildTemplateStep::Docker(DockerStep::Inline(
                lines.iter().map(|line| line.to_string()).collect(),
            ))],
        }
    }

    fn step(stages: Vec<Stage>) -> BuildStep {
        BuildStep {
            metadata: Metadata {
                name: Some("app".to_string()),
                ..Metadata::default()
            },
            stages,
            ..BuildStep::default()
        }
    }

    #[test]
    fn single_stage_scenario() {
        let resolver = Resolver::new(&[], Path::new("."), &NoRemoteFetch);
        let step = step(vec![inline_stage("stage-one", "alpine", &["RUN echo hi"])]);

        let text = render(&step, &resolver, &NoopDiagnostics).expect("step should render");
        assert_eq!(text, "FROM alpine AS stage-one\nRUN echo hi\n");
    }

    #[test]
    fn two_stage_scenario_has_one_separator() {
        let resolver = Resolver::new(&[], Path::new("."), &NoRemoteFetch);
        let step = step(vec![
            inline_stage("first-stage", "golang", &["RUN go build -o /out/app"]),
            inline_stage(
                "second-stage",
                "alpine",
                &["COPY --from=first-stage /out/app /app"],
            ),
        ]);

        let text = render(&step, &resolver, &NoopDiagnostics).expect("step should render");
        assert_eq!(
            text,
            "FROM golang AS first-stage\nRUN go build -o /out/app\n\nFROM alpine AS second-stage\nCOPY --from=first-stage /out/app /app\n"
        );
    }

    #[test]
    fn n_stages_give_n_froms_and_n_minus_one_separators() {
        let resolver = Resolver::new(&[], Path::new("."), &NoRemoteFetch);
        let stages = (1..=4)
            .map(|n| inline_stage(&format!("s{n}"), "alpine", &[format!("RUN echo {n}").as_str()]))
            .collect();
        let text =
            render(&step(stages), &resolver, &NoopDiagnostics).expect("step should render");

        let froms: Vec<&str> = text.lines().filter(|l| l.starts_with("FROM ")).collect();
        assert_eq!(
            froms,
            vec![
                "FROM alpine AS s1",
                "FROM alpine AS s2",
                "FROM alpine AS s3",
                "FROM alpine AS s4",
            ]
        );
        assert_eq!(text.matches("\n\nFROM ").count(), 3);
        assert!(!text.contains("\n\n\n"));
        assert!(text.ends_with("RUN echo 4\n"));
    }

    #[test]
    fn from_recurrence_is_separated_once() {
        let instructions = vec![
            Instruction::from_line("FROM a", 1).expect("line should map"),
            Instruction::from_line("FROM b", 2).expect("line should map"),
        ];
        assert_eq!(render_instructions(&instructions), "FROM a\n\nFROM b\n");
    }

    #[test]
    fn step_without_stages_is_invalid() {
        let resolver = Resolver::new(&[], Path::new("."), &NoRemoteFetch);
        let err = render(&step(Vec::new()), &resolver, &NoopDiagnostics)
            .expect_err("empty step should fail");
        assert!(matches!(err, Error::InvalidSpec { .. }));
    }

    #[test]
    fn compile_all_writes_one_file_per_step() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let spec = Specification {
            steps: vec![
                step(vec![inline_stage("one", "alpine", &["RUN echo one"])]),
                step(vec![inline_stage("two", "debian", &["RUN echo two"])]),
            ],
            templates: Vec::new(),
        };
        let diagnostics = RecordingDiagnostics::default();

        let context = LocalContext::new(dir.path());
        let paths = compile_all(&spec, &context, &NoRemoteFetch, &diagnostics)
            .expect("spec should compile");

        assert_eq!(paths.len(), 2);
        assert_ne!(paths[0], paths[1]);
        for path in &paths {
            assert!(path.starts_with(dir.path()));
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .expect("file name should be utf-8");
            assert!(name.starts_with("Dockerfile."));
        }
        assert_eq!(
            std::fs::read_to_string(&paths[1]).expect("build file should be readable"),
            "FROM debian AS two\nRUN echo two\n"
        );
        assert!(diagnostics
            .messages()
            .iter()
            .any(|message| message.starts_with("wrote build file for app")));
    }

    #[test]
    fn failure_removes_files_from_earlier_steps() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let mut broken = inline_stage("two", "alpine", &[]);
        broken.template = Some("missing".to_string());
        let spec = Specification {
            steps: vec![
                step(vec![inline_stage("one", "alpine", &["RUN echo one"])]),
                step(vec![broken]),
            ],
            templates: Vec::new(),
        };

        let context = LocalContext::new(dir.path());
        let err = compile_all(&spec, &context, &NoRemoteFetch, &NoopDiagnostics)
            .expect_err("second step should fail");
        assert!(matches!(err, Error::TemplateNotFound { .. }));

        let remaining = std::fs::read_dir(dir.path())
            .expect("context should be readable")
            .count();
        assert_eq!(remaining, 0);
    }
}
