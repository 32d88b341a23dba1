//! Jenkins URL templates and path rendering.
//!
//! Paths are relative to the session base URL. Templates that embed a
//! branch drop the whole `job/{branchName}/` segment when the branch is
//! empty, which addresses the pipeline-level job instead.

pub const USER_DETAILS: &str = "me/api/json";
pub const CRUMB_ISSUER: &str = "crumbIssuer/api/json";
pub const PIPELINE_JOBS: &str = "job/{pipeLineName}/api/json?tree=jobs[name]";
pub const JOB_RUNS: &str = "job/{pipeLineName}/job/{branchName}/wfapi/runs";
pub const JOB_RUN: &str = "job/{pipeLineName}/job/{branchName}/{jobId}/api/json";
pub const JOB_CONSOLE_TEXT: &str = "job/{pipeLineName}/job/{branchName}/{jobNumber}/consoleText";
pub const BUILD_WITH_PARAMETERS: &str = "job/{pipeLineName}/buildWithParameters?";
pub const BUILDS_FROM_QUEUE: &str =
    "job/{pipeLineName}/api/json?tree=builds[id,number,result,queueId]";

const BRANCH_SEGMENT: &str = "job/{branchName}/";

fn with_branch(template: &str, pipeline: &str, branch: &str) -> String {
    let path = template.replace("{pipeLineName}", pipeline);
    if branch.is_empty() {
        path.replace(BRANCH_SEGMENT, "")
    } else {
        path.replace("{branchName}", branch)
    }
}

pub fn pipeline_jobs(pipeline: &str) -> String {
    PIPELINE_JOBS.replace("{pipeLineName}", pipeline)
}

pub fn job_runs(pipeline: &str, branch: &str) -> String {
    with_branch(JOB_RUNS, pipeline, branch)
}

pub fn job_run(pipeline: &str, branch: &str, job_id: &str) -> String {
    with_branch(JOB_RUN, pipeline, branch).replace("{jobId}", job_id)
}

pub fn job_console_text(pipeline: &str, branch: &str, job_number: &str) -> String {
    with_branch(JOB_CONSOLE_TEXT, pipeline, branch).replace("{jobNumber}", job_number)
}

pub fn builds_from_queue(pipeline: &str) -> String {
    BUILDS_FROM_QUEUE.replace("{pipeLineName}", pipeline)
}

/// `buildWithParameters?` followed by the form-encoded parameters.
pub fn build_with_parameters<'a, I>(pipeline: &str, params: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    BUILD_WITH_PARAMETERS.replace("{pipeLineName}", pipeline) + &query
}
