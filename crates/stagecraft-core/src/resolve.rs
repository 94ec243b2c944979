use std::path::Path;

use crate::ansible;
use crate::context::RemoteFetch;
use crate::error::Error;
use crate::model::Instruction;
use crate::parser::parse_file;
use crate::spec::{BuildTemplateStep, DockerStep, Stage, Template, UrlSource};

/// Turns stages into instruction sequences against one template list.
pub struct Resolver<'a> {
    templates: &'a [Template],
    context_dir: &'a Path,
    fetcher: &'a dyn RemoteFetch,
}

impl<'a> Resolver<'a> {
    pub fn new(
        templates: &'a [Template],
        context_dir: &'a Path,
        fetcher: &'a dyn RemoteFetch,
    ) -> Self {
        Self {
            templates,
            context_dir,
            fetcher,
        }
    }

    pub fn context_dir(&self) -> &Path {
        self.context_dir
    }

    /// `FROM`, then the stage's inline steps, then its template's steps.
    pub fn resolve(&self, stage: &Stage) -> Result<Vec<Instruction>, Error> {
        let template = match &stage.template {
            Some(name) => Some(self.template(name, stage)?),
            None => None,
        };

        let mut instructions = vec![from_instruction(stage)?];
        for step in &stage.cmd {
            self.expand(step, &mut instructions)?;
        }
        if let Some(template) = template {
            for step in &template.steps {
                self.expand(step, &mut instructions)?;
            }
        }

        Ok(instructions)
    }

    fn template(&self, name: &str, stage: &Stage) -> Result<&'a Template, Error> {
        self.templates
            .iter()
            .find(|template| template.name == name)
            .ok_or_else(|| Error::template_not_found(name, stage.display_name()))
    }

    fn expand(&self, step: &BuildTemplateStep, out: &mut Vec<Instruction>) -> Result<(), Error> {
        match step {
            BuildTemplateStep::Docker(DockerStep::Inline(lines)) => {
                out.extend(
                    lines
                        .iter()
                        .enumerate()
                        .filter_map(|(index, line)| Instruction::from_line(line, index + 1)),
                );
            }
            BuildTemplateStep::Docker(DockerStep::Path(path)) => {
                out.extend(parse_file(&self.context_dir.join(path))?);
            }
            BuildTemplateStep::Docker(DockerStep::Url(source)) => {
                out.extend(self.fetch(source)?);
            }
            BuildTemplateStep::Ansible(step) => out.extend(ansible::instructions(step)),
        }
        Ok(())
    }

    fn fetch(&self, source: &UrlSource) -> Result<Vec<Instruction>, Error> {
        // Removed again when `fragment` drops.
        let fragment = tempfile::Builder::new()
            .prefix(".stagecraft-fetch-")
            .suffix(".Dockerfile")
            .tempfile_in(self.context_dir)?;
        self.fetcher
            .fetch(&source.url, fragment.path(), source.credentials.as_ref())?;
        parse_file(fragment.path())
    }
}

fn from_instruction(stage: &Stage) -> Result<Instruction, Error> {
    if stage.base.image.trim().is_empty() {
        return Err(Error::missing_base_image(stage.display_name()));
    }

    let mut value = vec![stage.base.reference()];
    if let Some(name) = stage.metadata.name.as_deref().filter(|name| !name.is_empty()) {
        value.push("AS".to_string());
        value.push(name.to_string());
    }

    let mut instruction = Instruction {
        cmd: "from".to_string(),
        value,
        ..Instruction::default()
    };
    instruction.original = instruction.render();
    Ok(instruction)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::{Path, PathBuf};

    use crate::context::{NoRemoteFetch, RemoteFetch};
    use crate::error::Error;
    use crate::resolve::Resolver;
    use crate::spec::{
        AnsibleStep, BaseImage, BuildTemplateStep, CredentialSpec, DockerStep, LocalPlaybook,
        Metadata, Stage, Template, UrlSource,
    };

    fn stage(name: &str, image: &str) -> Stage {
        Stage {
            metadata: Metadata {
                name: Some(name.to_string()),
                ..Metadata::default()
            },
            base: BaseImage {
                image: image.to_string(),
                ..BaseImage::default()
            },
            ..Stage::default()
        }
    }

    fn inline(lines: &[&str]) -> BuildTemplateStep {
        BuildTemplateStep::Docker(DockerStep::Inline(
            lines.iter().map(|line| line.to_string()).collect(),
        ))
    }

    fn rendered(resolver: &Resolver<'_>, stage: &Stage) -> Vec<String> {
        resolver
            .resolve(stage)
            .expect("stage should resolve")
            .iter()
            .map(|instruction| instruction.render())
            .collect()
    }

    #[test]
    fn emits_from_then_inline_then_template() {
        let templates = vec![Template {
            name: "tpl".to_string(),
            steps: vec![inline(&["RUN make"])],
        }];
        let resolver = Resolver::new(&templates, Path::new("."), &NoRemoteFetch);

        let mut stage = stage("build", "golang");
        stage.base.tag = Some("1.22".to_string());
        stage.template = Some("tpl".to_string());
        stage.cmd = vec![inline(&["RUN echo first", "", "ENV A=1"])];

        assert_eq!(
            rendered(&resolver, &stage),
            vec!["FROM golang:1.22 AS build", "RUN echo first", "ENV A=1", "RUN make"]
        );
    }

    #[test]
    fn stage_without_steps_compiles_to_base_only() {
        let resolver = Resolver::new(&[], Path::new("."), &NoRemoteFetch);
        let mut stage = stage("", "alpine");
        stage.metadata.name = None;
        assert_eq!(rendered(&resolver, &stage), vec!["FROM alpine"]);
    }

    #[test]
    fn missing_template_is_fatal() {
        let resolver = Resolver::new(&[], Path::new("."), &NoRemoteFetch);
        let mut stage = stage("build", "alpine");
        stage.template = Some("absent".to_string());
        stage.cmd = vec![inline(&["RUN echo hi"])];

        let err = resolver.resolve(&stage).expect_err("resolution should fail");
        assert!(matches!(
            err,
            Error::TemplateNotFound { ref name, ref stage } if name == "absent" && stage == "build"
        ));
    }

    #[test]
    fn empty_base_image_is_rejected() {
        let resolver = Resolver::new(&[], Path::new("."), &NoRemoteFetch);
        let err = resolver
            .resolve(&stage("build", " "))
            .expect_err("resolution should fail");
        assert!(matches!(err, Error::MissingBaseImage { .. }));
    }

    #[test]
    fn resolution_is_deterministic() {
        let templates = vec![Template {
            name: "tpl".to_string(),
            steps: vec![
                inline(&["RUN a", "RUN b"]),
                BuildTemplateStep::Ansible(AnsibleStep::Local(LocalPlaybook {
                    workspace: "/ansible".to_string(),
                    playbook: "site.yml".to_string(),
                })),
            ],
        }];
        let resolver = Resolver::new(&templates, Path::new("."), &NoRemoteFetch);
        let mut stage = stage("s", "alpine");
        stage.template = Some("tpl".to_string());

        let first = resolver.resolve(&stage).expect("stage should resolve");
        let second = resolver.resolve(&stage).expect("stage should resolve");
        assert_eq!(first, second);
    }

    #[test]
    fn path_step_parses_fragment_from_context() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        std::fs::write(
            dir.path().join("fragment.Dockerfile"),
            "run apk add curl\nCOPY --chown=app src /src\nFROM alpine AS final\n",
        )
        .expect("fragment write should succeed");

        let templates = vec![Template {
            name: "tpl".to_string(),
            steps: vec![BuildTemplateStep::Docker(DockerStep::Path(PathBuf::from(
                "fragment.Dockerfile",
            )))],
        }];
        let resolver = Resolver::new(&templates, dir.path(), &NoRemoteFetch);
        let mut stage = stage("base", "alpine");
        stage.template = Some("tpl".to_string());

        assert_eq!(
            rendered(&resolver, &stage),
            vec![
                "FROM alpine AS base",
                "RUN apk add curl",
                "COPY --chown=app src /src",
                "FROM alpine AS final",
            ]
        );
    }

    struct FakeFetch {
        requests: RefCell<Vec<(String, Option<CredentialSpec>)>>,
    }

    impl RemoteFetch for FakeFetch {
        fn fetch(
            &self,
            url: &str,
            dest: &Path,
            credentials: Option<&CredentialSpec>,
        ) -> Result<(), Error> {
            self.requests
                .borrow_mut()
                .push((url.to_string(), credentials.cloned()));
            std::fs::write(dest, "RUN ./install.sh\n")?;
            Ok(())
        }
    }

    #[test]
    fn url_step_fetches_into_context_and_cleans_up() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let fetcher = FakeFetch {
            requests: RefCell::new(Vec::new()),
        };
        let templates = vec![Template {
            name: "remote".to_string(),
            steps: vec![BuildTemplateStep::Docker(DockerStep::Url(UrlSource {
                url: "https://example.com/install.Dockerfile".to_string(),
                credentials: Some(CredentialSpec::Env("TOKEN".to_string())),
            }))],
        }];
        let resolver = Resolver::new(&templates, dir.path(), &fetcher);
        let mut stage = stage("s", "alpine");
        stage.template = Some("remote".to_string());

        assert_eq!(
            rendered(&resolver, &stage),
            vec!["FROM alpine AS s", "RUN ./install.sh"]
        );
        assert_eq!(
            fetcher.requests.borrow().as_slice(),
            &[(
                "https://example.com/install.Dockerfile".to_string(),
                Some(CredentialSpec::Env("TOKEN".to_string()))
            )]
        );

        let leftovers = std::fs::read_dir(dir.path())
            .expect("context should be readable")
            .count();
        assert_eq!(leftovers, 0);
    }
}
