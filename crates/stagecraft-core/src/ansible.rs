use crate::model::Instruction;
use crate::spec::AnsibleStep;

const PREAMBLE: &str = "WORKDIR {workspace}
COPY templates {workspace}/templates
COPY files {workspace}/files
COPY vars {workspace}/vars
COPY tasks {workspace}/tasks
ADD *.yml {workspace}/";

const LOCAL_RUN: &str = "RUN ansible-playbook {playbook}";

// The requirements check runs inside the image build, not here.
const GALAXY_RUN: &str = "RUN if [ -f {requirements} ]; then ansible-galaxy install -r {requirements}; fi && ansible-galaxy install {role}";

const GALAXY_PLAYBOOK: &str = " && ansible-playbook {playbook}";

/// Expands an Ansible step into the instructions that stage the workspace and run it.
pub fn instructions(step: &AnsibleStep) -> Vec<Instruction> {
    let (workspace, run) = match step {
        AnsibleStep::Local(local) => (
            &local.workspace,
            LOCAL_RUN.replace("{playbook}", &local.playbook),
        ),
        AnsibleStep::Galaxy(galaxy) => {
            let mut run = GALAXY_RUN
                .replace("{requirements}", &galaxy.requirements)
                .replace("{role}", &galaxy.role);
            if let Some(playbook) = &galaxy.playbook {
                run.push_str(&GALAXY_PLAYBOOK.replace("{playbook}", playbook));
            }
            (&galaxy.workspace, run)
        }
    };

    let workspace = normalize_workspace(workspace);
    let text = format!("{}\n{run}", PREAMBLE.replace("{workspace}", &workspace));

    text.lines()
        .enumerate()
        .filter_map(|(index, line)| Instruction::from_line(line, index + 1))
        .collect()
}

fn normalize_workspace(workspace: &str) -> String {
    let trimmed = workspace.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use crate::ansible::instructions;
    use crate::spec::{AnsibleStep, GalaxyRole, LocalPlaybook};

    fn rendered(step: &AnsibleStep) -> Vec<String> {
        instructions(step).iter().map(|i| i.render()).collect()
    }

    #[test]
    fn local_playbook_stages_workspace_then_runs() {
        let step = AnsibleStep::Local(LocalPlaybook {
            workspace: "/ansible/".to_string(),
            playbook: "site.yml".to_string(),
        });

        assert_eq!(
            rendered(&step),
            vec![
                "WORKDIR /ansible",
                "COPY templates /ansible/templates",
                "COPY files /ansible/files",
                "COPY vars /ansible/vars",
                "COPY tasks /ansible/tasks",
                "ADD *.yml /ansible/",
                "RUN ansible-playbook site.yml",
            ]
        );
    }

    #[test]
    fn galaxy_role_bakes_requirements_check_into_shell() {
        let step = AnsibleStep::Galaxy(GalaxyRole {
            workspace: "/work".to_string(),
            role: "geerlingguy.docker".to_string(),
            requirements: "requirements.yml".to_string(),
            playbook: Some("site.yml".to_string()),
        });

        let lines = rendered(&step);
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "WORKDIR /work");
        assert_eq!(
            lines[6],
            "RUN if [ -f requirements.yml ]; then ansible-galaxy install -r requirements.yml; fi \
             && ansible-galaxy install geerlingguy.docker && ansible-playbook site.yml"
        );
    }

    #[test]
    fn local_and_galaxy_differ_only_in_run_instruction() {
        let local = rendered(&AnsibleStep::Local(LocalPlaybook {
            workspace: "/ansible".to_string(),
            playbook: "site.yml".to_string(),
        }));
        let galaxy = rendered(&AnsibleStep::Galaxy(GalaxyRole {
            workspace: "/ansible".to_string(),
            role: "acme.web".to_string(),
            requirements: "requirements.yml".to_string(),
            playbook: None,
        }));

        assert_eq!(local[..6], galaxy[..6]);
        assert_ne!(local[6], galaxy[6]);
    }
}
