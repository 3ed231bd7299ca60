//! Cleanup that runs exactly once, however the pod ends.
//!
//! The routine is installed as the `EXIT` trap before the first resource is created, so every
//! exit path runs it: success, a failed container, `pod_abort`, a signal. SIGINT and SIGTERM are
//! turned into plain exits so they go through the trap too. Removal skips resources that were
//! never created and keeps going when one removal fails.

use tracing::debug;

use crate::{compiler::Plan, exitcode, script::Script};

/// Helper functions, the teardown routine and the traps. Must come before anything that creates
/// a resource.
pub(crate) fn emit(plan: &Plan) -> Script {
    let engine = plan.engine_word();
    let resources = plan.resources;
    let mut script = Script::new();

    script.comment("teardown");
    script.line("pod_torn_down=0");
    script.line("pod_watchers=()");
    script.line("pod_events=");
    script.blank();

    script.block("pod_abort() {", "}", |s| {
        s.line(r#"echo "podscript: $2" >&2"#);
        s.line(r#"exit "$1""#);
    });
    script.blank();

    for (kind, remove) in [
        ("container", "rm -f"),
        ("network", "network rm"),
        ("volume", "volume rm"),
    ] {
        script.block(format!("pod_remove_{}() {{", kind), "}", |s| {
            s.block(
                format!(r#"if {} {} inspect "$1" >/dev/null 2>&1; then"#, engine, kind),
                "fi",
                |s| {
                    s.line(format!(
                        r#"{} {} "$1" >/dev/null || echo "podscript: failed to remove {} $1" >&2"#,
                        engine, remove, kind
                    ));
                },
            );
        });
        script.blank();
    }

    if plan.options.dump_logs {
        script.block("pod_dump_logs() {", "}", |s| {
            s.block(
                format!(r#"if {} container inspect "$1" >/dev/null 2>&1; then"#, engine),
                "fi",
                |s| {
                    s.line(r#"echo "podscript: logs of container $2 ($1):" >&2"#);
                    s.line(format!(r#"{} logs "$1" >&2 2>&1"#, engine));
                },
            );
        });
        script.blank();
    }

    script.block("pod_teardown() {", "}", |s| {
        s.line("local status=$?");
        s.line("trap - EXIT INT TERM");
        s.block(r#"if [ "$pod_torn_down" -eq 1 ]; then"#, "fi", |s| {
            s.line("return");
        });
        s.line("pod_torn_down=1");
        s.block(r#"if [ "${#pod_watchers[@]}" -gt 0 ]; then"#, "fi", |s| {
            s.line(r#"kill "${pod_watchers[@]}" 2>/dev/null"#);
        });
        if plan.options.dump_logs {
            for container in &resources.containers {
                s.line(format!(
                    "pod_dump_logs {} {}",
                    container.resource, container.declared
                ));
            }
        }
        for container in resources.removal_order() {
            s.line(format!("pod_remove_container {}", container));
        }
        s.line(format!("pod_remove_network {}", resources.network));
        for volume in &resources.volumes {
            s.line(format!("pod_remove_volume {}", volume.resource));
        }
        s.block(r#"if [ -n "$pod_events" ]; then"#, "fi", |s| {
            s.line(r#"rm -rf "$pod_events""#);
        });
        s.line(r#"exit "$status""#);
    });
    script.blank();

    script.line("trap pod_teardown EXIT");
    script.line(format!("trap 'exit {}' INT", exitcode::INTERRUPTED));
    script.line(format!("trap 'exit {}' TERM", exitcode::TERMINATED));

    debug!(
        pod = %resources.pod,
        containers = resources.removal_order().count(),
        volumes = resources.volumes.len(),
        "emitted teardown"
    );
    script
}
