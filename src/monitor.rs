//! Launch the main containers together and watch them until the pod's outcome is known.
//!
//! Every container is created first, then all of them are started detached. One watcher per
//! container blocks on the engine's `wait` and writes `<container> <exit code>` to a FIFO. The
//! monitor loop reads that FIFO, so events arrive in completion order and the loop only blocks
//! while waiting for the next one.
//!
//! The first non-zero exit decides the pod's exit code: the remaining containers are killed and
//! the script exits without waiting for them. When the first failure is observed, containers
//! that have already exited non-zero are compared by declaration order and the lowest index
//! wins, so near-simultaneous failures report a stable code. Zero from every container exits 0.

use tracing::debug;

use crate::{
    compiler::Plan,
    error::NameKind,
    exitcode, launch,
    script::{quote, Script},
};

pub(crate) fn emit(plan: &Plan) -> Script {
    let engine = plan.engine_word();
    let containers = &plan.resources.containers;
    let names: Vec<&str> = containers.iter().map(|c| c.resource.as_str()).collect();
    let mut script = Script::new();

    script.comment("containers");
    for (container, owned) in plan.spec.containers.iter().zip(containers) {
        if let Some(pull) = launch::pull(plan, NameKind::Container, container) {
            script.line(pull);
        }
        script.line(launch::create(plan, NameKind::Container, container, owned));
    }
    for owned in containers {
        script.line(format!(
            "{} start {} >/dev/null || {}",
            engine,
            owned.resource,
            launch::abort(
                exitcode::LAUNCH_FAILED,
                &format!("failed to start container {}", owned.declared)
            )
        ));
    }
    script.blank();

    script.comment("monitor");
    script.block("pod_watch() {", "}", |s| {
        s.line("trap - EXIT INT TERM");
        s.line("local code");
        s.line(format!(r#"code=$({} wait "$1" 2>/dev/null) || code="#, engine));
        s.line(r#"echo "$1 $code" >&3"#);
    });
    script.blank();

    script.block("pod_fail() {", "}", |s| {
        s.line("local name=$1 status=$2 candidate state");
        s.block(
            format!("for candidate in {}; do", names.join(" ")),
            "done",
            |s| {
                s.line(format!(
                    "state=$({} container inspect --format {} \"$candidate\" 2>/dev/null) || continue",
                    engine,
                    quote("{{.State.Status}} {{.State.ExitCode}}")
                ));
                s.block(
                    r#"if [ "${state%% *}" = exited ] && [ "${state##* }" != 0 ]; then"#,
                    "fi",
                    |s| {
                        s.line("name=$candidate");
                        s.line("status=${state##* }");
                        s.line("break");
                    },
                );
            },
        );
        s.line(r#"echo "podscript: container $name failed with exit code $status" >&2"#);
        s.line(format!("{} kill {} >/dev/null 2>&1", engine, names.join(" ")));
        s.line(r#"exit "$status""#);
    });
    script.blank();

    let lost = |what: &str| launch::abort(exitcode::MONITOR_ABORTED, what);
    script.line(format!(
        r#"pod_events=$(mktemp -d "${{TMPDIR:-/tmp}}/podscript.XXXXXX") || {}"#,
        lost("failed to create the event directory")
    ));
    script.line(format!(
        r#"mkfifo "$pod_events/events" || {}"#,
        lost("failed to create the event channel")
    ));
    script.line(format!(
        r#"exec 3<>"$pod_events/events" || {}"#,
        lost("failed to open the event channel")
    ));
    for name in &names {
        script.line(format!("pod_watch {} &", name));
        script.line("pod_watchers+=($!)");
    }
    script.line(format!("pod_remaining={}", names.len()));
    script.block(r#"while [ "$pod_remaining" -gt 0 ]; do"#, "done", |s| {
        s.line(format!(
            "read -r pod_name pod_status <&3 || {}",
            lost("lost track of the running containers")
        ));
        s.block(r#"case "$pod_status" in"#, "esac", |s| {
            s.line(format!(
                r#"''|*[!0-9]*) pod_abort {} "could not read the exit code of container $pod_name" ;;"#,
                exitcode::MONITOR_ABORTED
            ));
        });
        s.line("pod_remaining=$((pod_remaining - 1))");
        s.block(r#"if [ "$pod_status" -ne 0 ]; then"#, "fi", |s| {
            s.line(r#"pod_fail "$pod_name" "$pod_status""#);
        });
        s.line(r#"echo "podscript: container $pod_name exited with code 0" >&2"#);
    });
    script.line("exit 0");

    debug!(
        pod = %plan.resources.pod,
        containers = names.len(),
        "emitted launch and monitor"
    );
    script
}
